use console::style;
use grpc_steps::{Registry, registry::ServiceMethod};
use std::fmt::Display;

/// A wrapper struct for a formatted, colored string.
///
/// Implements `Display` so it can be printed directly.
pub struct FormattedString(pub String);

/// The methods of a registry, in lookup-key order.
pub struct MethodList<'a>(pub &'a Registry);

pub struct GenericError<T: Display>(pub &'static str, pub T);

impl std::fmt::Display for FormattedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", self.0)?;
        Ok(())
    }
}

impl<T: Display> From<GenericError<T>> for FormattedString {
    fn from(GenericError(msg, err): GenericError<T>) -> Self {
        FormattedString(format!("{}\n\n'{}'", style(msg).red().bold(), err))
    }
}

impl From<&ServiceMethod> for FormattedString {
    fn from(method: &ServiceMethod) -> Self {
        let stream = |enabled: bool| {
            if enabled {
                format!("{} ", style("stream").cyan())
            } else {
                String::new()
            }
        };

        FormattedString(format!(
            "{} {}({}{}) {} ({}{});",
            style("rpc").cyan(),
            style(method.method_name()).green(),
            stream(method.shape().is_client_streaming()),
            style(method.input().full_name()).yellow(),
            style("returns").cyan(),
            stream(method.shape().is_server_streaming()),
            style(method.output().full_name()).yellow()
        ))
    }
}

impl From<MethodList<'_>> for FormattedString {
    fn from(MethodList(registry): MethodList<'_>) -> Self {
        if registry.is_empty() {
            return FormattedString(style("No methods registered.").yellow().to_string());
        }

        let mut out = String::from("Registered Methods:\n");
        for (key, method) in registry.methods() {
            out.push_str(&format!(
                "  - {}\n      {}\n      {} {}\n",
                style(key).green(),
                FormattedString::from(method).0,
                style("address").cyan(),
                method.address()
            ));
        }

        FormattedString(out.trim_end().to_string())
    }
}
