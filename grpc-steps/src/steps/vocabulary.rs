//! # Step Vocabulary
//!
//! Sentence patterns understood by [`GrpcSteps::run_step`]. `gRPC`, `GRPC` and `grpc` are
//! interchangeable, as are the optional `a` and `method` words:
//!
//! ```gherkin
//! When I request a gRPC method "/grpctest.ItemService/GetItem" with payload:
//!   """
//!   {"id": 42}
//!   """
//! And the gRPC request has a header "locale" with value "en-US"
//! And the gRPC request timeout is "2s"
//! Then I should have a gRPC response match payload:
//!   """
//!   {"id": 42}
//!   """
//! ```
//!
//! | Sentence                                                                     | Doc string        |
//! |------------------------------------------------------------------------------|-------------------|
//! | `I request a gRPC method "<method>" with payload:`                           | payload           |
//! | `I request a gRPC method "<method>" with payload from file "<path>"`         |                   |
//! | `I request a gRPC method "<method>" with payload from file:`                 | path              |
//! | `I should have a gRPC response with payload:`                                | expected payload  |
//! | `I should have a gRPC response with payload from file "<path>"`              |                   |
//! | `I should have a gRPC response with payload from file:`                      | path              |
//! | `I should have a gRPC response match payload:`                               | expected payload  |
//! | `I should have a gRPC response match payload from file "<path>"`             |                   |
//! | `I should have a gRPC response match payload from file:`                     | path              |
//! | `I should have a gRPC response with code "<code>"`                           |                   |
//! | `I should have a gRPC response with error message "<message>"`               |                   |
//! | `I should have a gRPC response with code "<code>" and error message "<message>"` |               |
//! | `I should have a gRPC response with error message:`                          | message           |
//! | `I should have a gRPC response with code "<code>" and error message:`        | message           |
//! | `the gRPC request has a header "<key>" with value "<value>"`                 |                   |
//! | `the gRPC request timeout is "<duration>"`                                   |                   |
//! | `the gRPC metadata has a header "<key>" with value "<value>"`                |                   |
use super::{GrpcSteps, StepError};
use crate::scenario::ScenarioState;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sentence {
    Request,
    RequestFromFile,
    RequestFromFileDocString,
    ResponseEqual,
    ResponseEqualFromFile,
    ResponseEqualFromFileDocString,
    ResponseMatch,
    ResponseMatchFromFile,
    ResponseMatchFromFileDocString,
    Code,
    ErrorMessage,
    CodeAndErrorMessage,
    ErrorMessageDocString,
    CodeAndErrorMessageDocString,
    RequestHeader,
    RequestTimeout,
    MetadataHeader,
}

static VOCABULARY: Lazy<Vec<(Sentence, Regex)>> = Lazy::new(|| {
    const REQUEST: &str = r#"^I request(?: a)? (?:gRPC|GRPC|grpc)(?: method)? "([^"]*)" with payload"#;
    const RESPONSE: &str = r"^I should have(?: a)? (?:gRPC|GRPC|grpc) response";
    const PLANNED: &str = r"^(?:the|The) (?:gRPC|GRPC|grpc) request";

    let patterns = [
        (Sentence::Request, format!("{REQUEST}:?$")),
        (Sentence::RequestFromFile, format!(r#"{REQUEST} from file "([^"]+)"$"#)),
        (Sentence::RequestFromFileDocString, format!("{REQUEST} from file:$")),
        (Sentence::ResponseEqual, format!("{RESPONSE} with payload:?$")),
        (
            Sentence::ResponseEqualFromFile,
            format!(r#"{RESPONSE} with payload from file "([^"]+)"$"#),
        ),
        (
            Sentence::ResponseEqualFromFileDocString,
            format!("{RESPONSE} with payload from file:?$"),
        ),
        (Sentence::ResponseMatch, format!("{RESPONSE} match payload:?$")),
        (
            Sentence::ResponseMatchFromFile,
            format!(r#"{RESPONSE} match payload from file "([^"]+)"$"#),
        ),
        (
            Sentence::ResponseMatchFromFileDocString,
            format!("{RESPONSE} match payload from file:?$"),
        ),
        (Sentence::Code, format!(r#"{RESPONSE} with code "([^"]*)"$"#)),
        (
            Sentence::ErrorMessage,
            format!(r#"{RESPONSE} with error (?:message )?"([^"]*)"$"#),
        ),
        (
            Sentence::CodeAndErrorMessage,
            format!(r#"{RESPONSE} with code "([^"]*)" and error (?:message )?"([^"]*)"$"#),
        ),
        (
            Sentence::ErrorMessageDocString,
            format!("{RESPONSE} with error(?: message)?:$"),
        ),
        (
            Sentence::CodeAndErrorMessageDocString,
            format!(r#"{RESPONSE} with code "([^"]*)" and error(?: message)?:$"#),
        ),
        (
            Sentence::RequestHeader,
            format!(r#"{PLANNED} has(?: a)? header "([^"]*)" with value "([^"]*)"$"#),
        ),
        (
            Sentence::RequestTimeout,
            format!(r#"{PLANNED} timeout is "([^"]*)"$"#),
        ),
        (
            Sentence::MetadataHeader,
            r#"^(?:the|The) (?:gRPC|GRPC|grpc) metadata has(?: a)? header "([^"]*)" with value "([^"]*)"$"#
                .to_string(),
        ),
    ];

    patterns
        .into_iter()
        .map(|(sentence, pattern)| {
            let regex = Regex::new(&pattern).expect("valid step pattern");
            (sentence, regex)
        })
        .collect()
});

/// Whether `text` is a sentence of the vocabulary.
pub fn is_defined(text: &str) -> bool {
    lookup(text).is_some()
}

fn lookup(text: &str) -> Option<(Sentence, Captures<'_>)> {
    VOCABULARY
        .iter()
        .find_map(|(sentence, regex)| regex.captures(text).map(|captures| (*sentence, captures)))
}

impl GrpcSteps {
    /// Runs the step whose sentence is `text`.
    ///
    /// `docstring` is the content of the doc string attached to the step, if any.
    pub async fn run_step(
        &self,
        state: &mut ScenarioState,
        text: &str,
        docstring: Option<&str>,
    ) -> Result<(), StepError> {
        let text = text.trim();
        let (sentence, captures) =
            lookup(text).ok_or_else(|| StepError::UndefinedStep(text.to_string()))?;

        let arg = |index: usize| captures.get(index).map_or("", |m| m.as_str());
        let doc = || docstring.ok_or_else(|| StepError::MissingDocString(text.to_string()));
        let doc_path = || doc().map(str::trim);

        match sentence {
            Sentence::Request => self.request(state, arg(1), doc()?),
            Sentence::RequestFromFile => self.request_from_file(state, arg(1), arg(2)).await,
            Sentence::RequestFromFileDocString => {
                self.request_from_file(state, arg(1), doc_path()?).await
            }
            Sentence::ResponseEqual => self.response_equals(state, doc()?).await,
            Sentence::ResponseEqualFromFile => self.response_equals_file(state, arg(1)).await,
            Sentence::ResponseEqualFromFileDocString => {
                self.response_equals_file(state, doc_path()?).await
            }
            Sentence::ResponseMatch => self.response_matches(state, doc()?).await,
            Sentence::ResponseMatchFromFile => self.response_matches_file(state, arg(1)).await,
            Sentence::ResponseMatchFromFileDocString => {
                self.response_matches_file(state, doc_path()?).await
            }
            Sentence::Code => self.response_has_code(state, arg(1)).await,
            Sentence::ErrorMessage => self.response_has_error_message(state, arg(1)).await,
            Sentence::CodeAndErrorMessage => {
                self.response_has_code_and_error_message(state, arg(1), arg(2))
                    .await
            }
            Sentence::ErrorMessageDocString => {
                self.response_has_error_message(state, doc()?).await
            }
            Sentence::CodeAndErrorMessageDocString => {
                self.response_has_code_and_error_message(state, arg(1), doc()?)
                    .await
            }
            Sentence::RequestHeader => self.request_header(state, arg(1), arg(2)),
            Sentence::RequestTimeout => self.request_timeout(state, arg(1)),
            Sentence::MetadataHeader => self.outgoing_header(state, arg(1), arg(2)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(text: &str) -> Option<Sentence> {
        lookup(text).map(|(sentence, _)| sentence)
    }

    #[test]
    fn request_sentences() {
        for text in [
            r#"I request a gRPC method "/grpctest.ItemService/GetItem" with payload:"#,
            r#"I request grpc "/grpctest.ItemService/GetItem" with payload"#,
            r#"I request a GRPC method "" with payload"#,
        ] {
            assert_eq!(sentence(text), Some(Sentence::Request), "{text}");
        }

        assert_eq!(
            sentence(r#"I request a gRPC method "ItemService/GetItem" with payload from file "a.json""#),
            Some(Sentence::RequestFromFile)
        );
        assert_eq!(
            sentence(r#"I request a gRPC method "ItemService/GetItem" with payload from file:"#),
            Some(Sentence::RequestFromFileDocString)
        );
    }

    #[test]
    fn response_sentences() {
        let cases = [
            ("I should have a gRPC response with payload:", Sentence::ResponseEqual),
            ("I should have grpc response with payload", Sentence::ResponseEqual),
            (
                r#"I should have a gRPC response with payload from file "r.json""#,
                Sentence::ResponseEqualFromFile,
            ),
            (
                "I should have a gRPC response with payload from file:",
                Sentence::ResponseEqualFromFileDocString,
            ),
            ("I should have a gRPC response match payload:", Sentence::ResponseMatch),
            (
                r#"I should have a gRPC response match payload from file "r.json""#,
                Sentence::ResponseMatchFromFile,
            ),
            (
                "I should have a gRPC response match payload from file",
                Sentence::ResponseMatchFromFileDocString,
            ),
            (r#"I should have a gRPC response with code "NOT_FOUND""#, Sentence::Code),
            (
                r#"I should have a gRPC response with error message "item missing""#,
                Sentence::ErrorMessage,
            ),
            (
                r#"I should have a gRPC response with error "item missing""#,
                Sentence::ErrorMessage,
            ),
            (
                r#"I should have a gRPC response with code "not found" and error message "item missing""#,
                Sentence::CodeAndErrorMessage,
            ),
            (
                "I should have a gRPC response with error message:",
                Sentence::ErrorMessageDocString,
            ),
            (
                r#"I should have a gRPC response with code "5" and error:"#,
                Sentence::CodeAndErrorMessageDocString,
            ),
        ];

        for (text, expected) in cases {
            assert_eq!(sentence(text), Some(expected), "{text}");
        }
    }

    #[test]
    fn planner_sentences() {
        assert_eq!(
            sentence(r#"the gRPC request has a header "locale" with value "en-US""#),
            Some(Sentence::RequestHeader)
        );
        assert_eq!(
            sentence(r#"The grpc request timeout is "500ms""#),
            Some(Sentence::RequestTimeout)
        );
        assert_eq!(
            sentence(r#"the gRPC metadata has header "x-trace-bin" with value "abc""#),
            Some(Sentence::MetadataHeader)
        );
    }

    #[test]
    fn unrelated_sentences_are_undefined() {
        assert!(!is_defined("I request a coffee"));
        assert!(!is_defined(r#"I should have a gRPC response with code NOT_FOUND"#));
    }

    #[test]
    fn captures_arguments() {
        let (_, captures) = lookup(
            r#"I should have a gRPC response with code "not found" and error message "item missing""#,
        )
        .unwrap();

        assert_eq!(&captures[1], "not found");
        assert_eq!(&captures[2], "item missing");
    }
}
