//! Decoded-message validation.
//!
//! There is no `ValidationLayer`: a generic `tower::Layer` only ever sees
//! `Request<Body>`, and the decoded message type isn't known until
//! `ConnectRequest<T>`/`ConnectRequest<Streaming<T>>` extraction happens in
//! `message/request.rs`. [`Validatable`] is checked directly by those
//! extractors, gated by
//! [`ConnectContext::input_validation`](crate::context::ConnectContext::input_validation)
//! (set from [`ConnectLayer::input_validation`](crate::layer::ConnectLayer::input_validation)).

use crate::message::error::{Code, ConnectError};

/// Implemented by decoded request messages that can validate themselves.
/// Analogous to `protovalidate`'s generated `validate()` method, but not
/// tied to protobuf: any decoded message type can implement it.
///
/// The default accepts everything, so opting a message type in that needs no
/// validation is just `impl Validatable for MyMessage {}`.
pub trait Validatable {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Runs `T::validate`, turning a failure into an `InvalidArgument`
/// [`ConnectError`]. Called by the `ConnectRequest` extractors immediately
/// after decoding.
pub fn validate_or_reject<T: Validatable>(message: &T) -> Result<(), ConnectError> {
    message
        .validate()
        .map_err(|msg| ConnectError::new(Code::InvalidArgument, msg))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NonEmpty(String);

    impl Validatable for NonEmpty {
        fn validate(&self) -> Result<(), String> {
            if self.0.is_empty() {
                Err("must not be empty".to_string())
            } else {
                Ok(())
            }
        }
    }

    struct AlwaysOk;
    impl Validatable for AlwaysOk {}

    #[test]
    fn accepts_valid_message() {
        assert!(validate_or_reject(&NonEmpty("ok".into())).is_ok());
    }

    #[test]
    fn rejects_invalid_message_as_invalid_argument() {
        let err = validate_or_reject(&NonEmpty(String::new())).unwrap_err();
        assert!(matches!(err.code(), Code::InvalidArgument));
    }

    #[test]
    fn default_validate_accepts_everything() {
        assert!(validate_or_reject(&AlwaysOk).is_ok());
    }
}
