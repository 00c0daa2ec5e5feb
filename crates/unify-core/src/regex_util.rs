//! Compile-once regex helpers.

/// Define a function returning a lazily compiled `&'static Regex`.
///
/// The pattern must be a valid regex literal; compilation failure is a
/// programmer error and panics on first use.
macro_rules! static_regex {
    (fn $name:ident, $pattern:expr) => {
        pub(crate) fn $name() -> &'static regex::Regex {
            static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
            RE.get_or_init(|| regex::Regex::new($pattern).expect("static regex must compile"))
        }
    };
}

pub(crate) use static_regex;
