//! Product page parser
//!
//! Extraction order: embedded `__NEXT_DATA__` product payload, then JSON-LD
//! `Product`, then the DOM (`h1`, `[itemprop=price]`). The breadcrumb comes from
//! structured data first and the HTML trail second. A page without a
//! breadcrumb still parses; the product just ends up unmapped.

#![allow(clippy::uninlined_format_args)]

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::html_breadcrumb::DEFAULT_BREADCRUMB_SELECTORS;
use super::structured_data::{find_typed, next_data_product};
use super::{
    BreadcrumbExtractor, HtmlBreadcrumbExtractor, ParsingError, ParsingResult,
    StructuredDataExtractor, first_breadcrumb,
};
use crate::domain::breadcrumb::{BreadcrumbSourceKind, RawBreadcrumb};

static ITEM_ID_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"/(?:ip|produit)/[^/]+/(\d+)").ok());

/// What a product page yielded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductPage {
    pub url: String,
    pub store_product_id: Option<String>,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub breadcrumb: Option<RawBreadcrumb>,
}

pub struct ProductPageParser {
    structured: StructuredDataExtractor,
    product_trail: HtmlBreadcrumbExtractor,
    category_trail: HtmlBreadcrumbExtractor,
    title: Selector,
    price: Selector,
}

impl ProductPageParser {
    pub fn new() -> ParsingResult<Self> {
        let selectors: Vec<String> = DEFAULT_BREADCRUMB_SELECTORS.iter().map(|s| (*s).to_string()).collect();
        Self::with_breadcrumb_selectors(&selectors)
    }

    /// Parser whose HTML breadcrumb trail uses `selectors` instead of the defaults.
    pub fn with_breadcrumb_selectors(selectors: &[String]) -> ParsingResult<Self> {
        let parse = |s: &str| {
            Selector::parse(s).map_err(|e| ParsingError::invalid_selector(s, &e.to_string()))
        };
        Ok(Self {
            structured: StructuredDataExtractor::new()?,
            product_trail: HtmlBreadcrumbExtractor::with_selectors(selectors, BreadcrumbSourceKind::ProductPage)?,
            category_trail: HtmlBreadcrumbExtractor::with_selectors(selectors, BreadcrumbSourceKind::CategoryPage)?,
            title: parse("h1")?,
            price: parse(r#"[itemprop="price"]"#)?,
        })
    }

    /// Parses a product detail page.
    pub fn parse_product(&self, url: &str, body: &str) -> ParsingResult<ProductPage> {
        let document = Html::parse_document(body);

        let next_product = match self.structured.next_data(&document) {
            Ok(payload) => payload.and_then(|p| next_data_product(&p).cloned()),
            Err(e) => {
                debug!(url, error = %e, "Ignoring malformed __NEXT_DATA__");
                None
            }
        };
        let ld_product = self
            .structured
            .json_ld_blocks(&document)
            .iter()
            .find_map(|block| find_typed(block, "Product").cloned());

        let name = next_product
            .as_ref()
            .and_then(|p| string_field(p, &["name", "title"]))
            .or_else(|| ld_product.as_ref().and_then(|p| string_field(p, &["name"])))
            .or_else(|| self.dom_text(&document, &self.title));

        let price = next_product
            .as_ref()
            .and_then(next_data_price)
            .or_else(|| ld_product.as_ref().and_then(json_ld_price))
            .or_else(|| self.dom_price(&document));

        let store_product_id = item_id_from_url(url)
            .or_else(|| next_product.as_ref().and_then(|p| string_field(p, &["upc", "gtin", "sku", "usItemId"])))
            .or_else(|| ld_product.as_ref().and_then(|p| string_field(p, &["sku", "gtin13", "gtin", "productID"])));

        let extractors: [&dyn BreadcrumbExtractor; 2] = [&self.structured, &self.product_trail];
        let breadcrumb = first_breadcrumb(&extractors, &document);

        if name.is_none() && store_product_id.is_none() {
            return Err(ParsingError::required_field_missing("name", Some(url)));
        }

        Ok(ProductPage {
            url: url.to_string(),
            store_product_id,
            name,
            price,
            breadcrumb,
        })
    }

    /// Breadcrumb of a category page.
    pub fn parse_category(&self, body: &str) -> Option<RawBreadcrumb> {
        let document = Html::parse_document(body);
        let extractors: [&dyn BreadcrumbExtractor; 2] = [&self.category_trail, &self.structured];
        first_breadcrumb(&extractors, &document)
    }

    fn dom_text(&self, document: &Html, selector: &Selector) -> Option<String> {
        document
            .select(selector)
            .map(|el| el.text().collect::<Vec<_>>().join(" "))
            .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
            .find(|t| !t.is_empty())
    }

    fn dom_price(&self, document: &Html) -> Option<f64> {
        document.select(&self.price).find_map(|el| {
            el.value()
                .attr("content")
                .and_then(parse_price)
                .or_else(|| parse_price(&el.text().collect::<String>()))
        })
    }
}

/// Numeric id from `/ip/<slug>/<digits>` style URLs.
pub fn item_id_from_url(url: &str) -> Option<String> {
    let pattern = ITEM_ID_PATTERN.as_ref()?;
    pattern.captures(url).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match value.get(*k)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_price(s),
        _ => None,
    }
}

fn next_data_price(product: &Value) -> Option<f64> {
    let current = product.pointer("/priceInfo/currentPrice");
    current
        .and_then(|c| c.get("price").or_else(|| c.get("priceValue")))
        .and_then(number)
        .or_else(|| product.get("price").and_then(number))
}

fn json_ld_price(product: &Value) -> Option<f64> {
    let offers = product.get("offers")?;
    let offer = match offers {
        Value::Array(items) => items.first()?,
        other => other,
    };
    offer
        .get("price")
        .or_else(|| offer.get("lowPrice"))
        .and_then(number)
}

/// Parses "$4.97", "4,97 $" or "1,299.00".
pub fn parse_price(text: &str) -> Option<f64> {
    let kept: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if kept.is_empty() {
        return None;
    }
    let normalized = match (kept.rfind('.'), kept.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => kept.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => kept.replace(',', ""),
        (None, Some(comma)) if kept.len() - comma - 1 == 2 => kept.replace(',', "."),
        (None, Some(_)) => kept.replace(',', ""),
        _ => kept,
    };
    normalized.parse::<f64>().ok().filter(|p| p.is_finite() && *p >= 0.0)
}
