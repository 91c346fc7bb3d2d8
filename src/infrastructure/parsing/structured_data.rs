//! Structured-data breadcrumb extraction
//!
//! Two shapes are understood: a JSON-LD `BreadcrumbList` and the category list
//! carried by the page's embedded `__NEXT_DATA__` product payload.

use scraper::{Html, Selector};
use serde_json::Value;

use super::{BreadcrumbExtractor, ParsingError, ParsingResult, clean_segments};
use crate::domain::breadcrumb::{BreadcrumbSourceKind, RawBreadcrumb};

const JSON_LD_SELECTOR: &str = r#"script[type="application/ld+json"]"#;
const NEXT_DATA_SELECTOR: &str = "script#__NEXT_DATA__";

pub struct StructuredDataExtractor {
    json_ld: Selector,
    next_data: Selector,
}

impl StructuredDataExtractor {
    pub fn new() -> ParsingResult<Self> {
        let parse = |s: &str| {
            Selector::parse(s).map_err(|e| ParsingError::invalid_selector(s, &e.to_string()))
        };
        Ok(Self {
            json_ld: parse(JSON_LD_SELECTOR)?,
            next_data: parse(NEXT_DATA_SELECTOR)?,
        })
    }

    /// Builds a breadcrumb from a plain list of category level names.
    pub fn from_category_names<S: AsRef<str>>(names: &[S]) -> Option<RawBreadcrumb> {
        let segments = clean_segments(names.iter().map(|s| s.as_ref()));
        (!segments.is_empty()).then(|| RawBreadcrumb::new(segments, BreadcrumbSourceKind::StructuredData))
    }

    /// JSON-LD blocks of the page, parsed. Malformed blocks are skipped.
    pub fn json_ld_blocks(&self, document: &Html) -> Vec<Value> {
        document
            .select(&self.json_ld)
            .filter_map(|el| serde_json::from_str::<Value>(&el.text().collect::<String>()).ok())
            .collect()
    }

    /// The embedded `__NEXT_DATA__` payload, if the page has one.
    pub fn next_data(&self, document: &Html) -> ParsingResult<Option<Value>> {
        let Some(script) = document.select(&self.next_data).next() else {
            return Ok(None);
        };
        let text: String = script.text().collect();
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| ParsingError::structured_data(format!("__NEXT_DATA__: {e}"), None))
    }
}

/// Product object inside a `__NEXT_DATA__` payload.
pub fn next_data_product(next_data: &Value) -> Option<&Value> {
    let page_props = next_data.pointer("/props/pageProps")?;
    page_props
        .pointer("/initialData/data/product")
        .filter(|p| is_non_empty_object(p))
        .or_else(|| page_props.get("product").filter(|p| is_non_empty_object(p)))
}

fn is_non_empty_object(value: &Value) -> bool {
    value.as_object().is_some_and(|o| !o.is_empty())
}

/// Category names of a product payload (`categories: [{name}, ...]`).
pub fn product_category_names(product: &Value) -> Vec<String> {
    product
        .get("categories")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|c| c.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Finds the first object whose `@type` is `type_name`, looking through arrays and `@graph`.
pub fn find_typed<'a>(value: &'a Value, type_name: &str) -> Option<&'a Value> {
    match value {
        Value::Array(items) => items.iter().find_map(|v| find_typed(v, type_name)),
        Value::Object(map) => {
            let matches = match map.get("@type") {
                Some(Value::String(t)) => t == type_name,
                Some(Value::Array(ts)) => ts.iter().any(|t| t.as_str() == Some(type_name)),
                _ => false,
            };
            if matches {
                return Some(value);
            }
            map.get("@graph").and_then(|g| find_typed(g, type_name))
        }
        _ => None,
    }
}

/// Segment names of a `BreadcrumbList`, ordered by `position`.
pub fn breadcrumb_list_names(list: &Value) -> Vec<String> {
    let Some(items) = list.get("itemListElement").and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut positioned: Vec<(i64, usize, String)> = items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let name = item
                .get("name")
                .or_else(|| item.pointer("/item/name"))
                .and_then(Value::as_str)?;
            let position = item
                .get("position")
                .and_then(|p| p.as_i64().or_else(|| p.as_str().and_then(|s| s.parse().ok())))
                .unwrap_or(index as i64 + 1);
            Some((position, index, name.to_string()))
        })
        .collect();
    positioned.sort_by_key(|(position, index, _)| (*position, *index));
    positioned.into_iter().map(|(_, _, name)| name).collect()
}

impl BreadcrumbExtractor for StructuredDataExtractor {
    fn name(&self) -> &'static str {
        "structured_data"
    }

    fn extract(&self, document: &Html) -> ParsingResult<Option<RawBreadcrumb>> {
        for block in self.json_ld_blocks(document) {
            if let Some(list) = find_typed(&block, "BreadcrumbList") {
                if let Some(crumb) = Self::from_category_names(&breadcrumb_list_names(list)) {
                    return Ok(Some(crumb));
                }
            }
        }

        if let Some(payload) = self.next_data(document)? {
            if let Some(product) = next_data_product(&payload) {
                return Ok(Self::from_category_names(&product_category_names(product)));
            }
        }
        Ok(None)
    }
}
