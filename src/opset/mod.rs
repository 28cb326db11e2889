//! ONNX opset support gate
//!
//! The optimizer's handlers are written against a range of default-domain
//! opset versions; graphs outside the range are rejected up front. Extended
//! contrib operators additionally require the `com.microsoft` domain to be
//! imported at version 1.

use crate::error::{OnnxResult, TransformError};
use crate::graph::GraphContext;
use crate::proto::ModelProto;

/// ONNX default domain alias
pub const ONNX_DOMAIN: &str = "ai.onnx";

/// Contrib domain carrying the extended operator set
pub const EXTENDED_DOMAIN: &str = "com.microsoft";

/// Minimum default-domain opset the handlers are written against
pub const MIN_SUPPORTED_OPSET: i64 = 7;

/// Maximum default-domain opset covered by the handlers
pub const MAX_SUPPORTED_OPSET: i64 = 17;

/// Get the default-domain opset version of a graph context
///
/// The empty domain and "ai.onnx" are equivalent.
pub fn default_domain_opset(ctx: &GraphContext) -> Option<i64> {
    ctx.opset("").or_else(|| ctx.opset(ONNX_DOMAIN))
}

/// Get the default-domain opset version of a model
pub fn model_opset(model: &ModelProto) -> Option<i64> {
    model.get_opset_version()
}

/// Check whether a default-domain opset version is within the supported range
pub fn is_supported_opset(version: i64) -> bool {
    (MIN_SUPPORTED_OPSET..=MAX_SUPPORTED_OPSET).contains(&version)
}

/// Error-returning variant of the range check, for validation entry points
pub fn ensure_supported_opset(version: i64) -> OnnxResult<()> {
    if is_supported_opset(version) {
        Ok(())
    } else {
        Err(TransformError::UnsupportedOpset {
            version,
            min: MIN_SUPPORTED_OPSET,
            max: MAX_SUPPORTED_OPSET,
        })
    }
}

/// Check whether the extended operator set can be used with this graph
///
/// The contrib handlers are only valid when the graph imports the extended
/// domain at version 1.
pub fn extended_ops_available(ctx: &GraphContext) -> bool {
    ctx.opset(EXTENDED_DOMAIN) == Some(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::GraphProto;

    #[test]
    fn test_supported_range() {
        assert!(!is_supported_opset(MIN_SUPPORTED_OPSET - 1));
        assert!(is_supported_opset(MIN_SUPPORTED_OPSET));
        assert!(is_supported_opset(13));
        assert!(is_supported_opset(MAX_SUPPORTED_OPSET));
        assert!(!is_supported_opset(MAX_SUPPORTED_OPSET + 1));
    }

    #[test]
    fn test_ensure_supported_opset() {
        assert!(ensure_supported_opset(13).is_ok());
        assert!(matches!(
            ensure_supported_opset(5),
            Err(TransformError::UnsupportedOpset { version: 5, .. })
        ));
    }

    #[test]
    fn test_default_domain_aliases() {
        let mut ctx = GraphContext::new(&GraphProto::default());
        assert_eq!(default_domain_opset(&ctx), None);

        ctx.set_opset(ONNX_DOMAIN, 12);
        assert_eq!(default_domain_opset(&ctx), Some(12));

        // The empty domain takes precedence when both are present
        ctx.set_opset("", 14);
        assert_eq!(default_domain_opset(&ctx), Some(14));
    }

    #[test]
    fn test_extended_ops_available() {
        let mut ctx = GraphContext::new(&GraphProto::default());
        assert!(!extended_ops_available(&ctx));

        ctx.set_opset(EXTENDED_DOMAIN, 1);
        assert!(extended_ops_available(&ctx));

        ctx.set_opset(EXTENDED_DOMAIN, 2);
        assert!(!extended_ops_available(&ctx));
    }
}
