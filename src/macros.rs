#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

/// Declare a `StemRule` for the demo open-coder.
///
/// ```text
/// stem_rule! {
///     name: "measure_stem",
///     pattern: "δραχμ|κοτυλ",
///     guard: not_verbal,                // optional
///     emit: ("MEASURE", Certainty::High, "NOTE"),   // note optional
/// }
/// ```
macro_rules! stem_rule {
    (
        name: $name:expr,
        pattern: $pat:literal
        $(, guard: $guard:expr)?
        , emit: ($ty:expr, $certainty:expr $(, $note:expr)?)
        $(,)?
    ) => {{
        $crate::rules::demo::StemRule {
            name: $name,
            pattern: $crate::regex!($pat),
            guard: stem_rule!(@guard $($guard)?),
            mention_type: $ty,
            certainty: $certainty,
            note: stem_rule!(@note $($note)?),
        }
    }};
    (@guard) => { None };
    (@guard $guard:expr) => {{
        let guard: $crate::rules::demo::Guard = $guard;
        Some(guard)
    }};
    (@note) => { "" };
    (@note $note:expr) => { $note };
}
