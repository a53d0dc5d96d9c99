use std::sync::LazyLock;

use regex::Regex;

static EXPORT_DEFAULT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"export\s+default").expect("default-export pattern is valid"));

/// Rewrites the first `export default` into an assignment to the module export slot. Text without
/// a default export is returned unchanged.
pub fn rewrite_default_export(source: &str) -> String {
    EXPORT_DEFAULT
        .replace(source, "module.exports =")
        .into_owned()
}

/// Wraps module text in a function scoped over `(exports, module, ctx)` that yields the module's
/// export value.
pub fn wrap_module(source: &str) -> String {
    format!(
        "(function (exports, module, ctx) {{\n{}\n;return module.exports ?? exports;\n}})",
        rewrite_default_export(source)
    )
}
