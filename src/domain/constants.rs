//! 분류 도메인 상수들
//!
//! Canonical taxonomy, breadcrumb normalisation and review-ledger constants
//! shared by every layer. Configurable values live in
//! `infrastructure::config::defaults`; the values here are fixed by the domain.

/// Canonical taxonomy 특성 상수들
pub mod taxonomy {
    /// Number of canonical categories seeded at initialisation.
    ///
    /// The set is closed: nothing at runtime may add or remove a member.
    pub const CANONICAL_CATEGORY_COUNT: usize = 113;

    /// canon_id 는 1-based 로 부여됩니다
    pub const FIRST_CANON_ID: u16 = 1;
}

/// Breadcrumb 정규화 관련 상수들
pub mod breadcrumb {
    /// Separator used in every normalized path key.
    pub const CANONICAL_SEPARATOR: char = '>';

    /// Separators recognised when a breadcrumb arrives as one raw string.
    pub const RAW_SEPARATORS: &[char] = &['>', '›', '»', '|'];

    /// Word that `&` is unified to.
    pub const AND_WORD: &str = "and";

    /// Apostrophes are removed rather than turned into a word break ("kids' snacks" -> "kids snacks").
    pub const APOSTROPHES: &[char] = &['\'', '’', '‘', '`'];

    /// Leading crumbs that name the site root rather than a category.
    pub const HOME_CRUMBS: &[&str] = &["home", "accueil", "walmart", "walmart ca"];
}

/// 리졸버 관련 상수들
pub mod resolution {
    /// Shallowest prefix depth tried during fallback unless configured otherwise.
    pub const DEFAULT_MIN_DEPTH: usize = 1;
}

/// Unmapped review ledger 관련 상수들
pub mod review {
    /// Upper bound on example URLs kept per unmapped path.
    pub const DEFAULT_MAX_EXAMPLE_URLS: usize = 5;
}
