//! Helper macro enforcing consistent readiness log fields.
//!
//! Keeps `component`, `state_from` and `state_to` present on every state
//! transition log so downstream parsing can rely on them.

/// Log a component state transition plus any extra fields.
#[macro_export]
macro_rules! state_transition {
    ($level:ident, component = $component:expr, from = $from:expr, to = $to:expr $(, $field:ident = $value:expr )* $(,)?) => {
        tracing::$level!(
            component = $component,
            state_from = $from,
            state_to = $to,
            $($field = %$value,)*
            "readiness state transition"
        )
    };
}
