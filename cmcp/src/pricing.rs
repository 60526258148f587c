//! Tool pricing models.
//!
//! A tool declares one of three pricing modes; the payment gate turns the
//! declaration into a concrete USD amount per invocation. Dynamic prices
//! are computed from the validated (snake_case) argument object and clamped
//! into the declared band.

use cmcp_proto::mcp::PricingAdvert;
use serde_json::Value;

/// Computes a dynamic price in USD from the tool's argument object.
pub type PriceFn = fn(&Value) -> f64;

/// Pricing configuration for a tool.
#[derive(Clone)]
pub enum Pricing {
    /// No payment required.
    Free,

    /// Same price on every invocation.
    Fixed {
        /// Price in USD.
        usd: f64,
    },

    /// Price computed per invocation, clamped into `[min_usd, max_usd]`.
    Dynamic {
        /// Lower bound in USD.
        min_usd: f64,
        /// Upper bound in USD.
        max_usd: f64,
        /// Price computation over the argument object.
        compute: PriceFn,
    },
}

impl std::fmt::Debug for Pricing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => f.write_str("Free"),
            Self::Fixed { usd } => f.debug_struct("Fixed").field("usd", usd).finish(),
            Self::Dynamic { min_usd, max_usd, .. } => f
                .debug_struct("Dynamic")
                .field("min_usd", min_usd)
                .field("max_usd", max_usd)
                .finish_non_exhaustive(),
        }
    }
}

impl Pricing {
    /// Creates a fixed price.
    #[must_use]
    pub const fn fixed(usd: f64) -> Self {
        Self::Fixed { usd }
    }

    /// Creates a dynamic price band.
    #[must_use]
    pub const fn dynamic(min_usd: f64, max_usd: f64, compute: PriceFn) -> Self {
        Self::Dynamic {
            min_usd,
            max_usd,
            compute,
        }
    }

    /// Validates the declaration. Checked once at registration.
    ///
    /// # Errors
    ///
    /// Returns a description of the violation: negative prices, or a
    /// dynamic band with `min > max`.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Self::Free => Ok(()),
            Self::Fixed { usd } => {
                if usd < 0.0 || !usd.is_finite() {
                    Err(format!("fixed price must be a non-negative number, got {usd}"))
                } else {
                    Ok(())
                }
            }
            Self::Dynamic { min_usd, max_usd, .. } => {
                if min_usd < 0.0 || !min_usd.is_finite() || !max_usd.is_finite() {
                    Err(format!("dynamic band must be non-negative, got [{min_usd}, {max_usd}]"))
                } else if min_usd > max_usd {
                    Err(format!("dynamic band is inverted: min {min_usd} > max {max_usd}"))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Returns the price in USD for a specific invocation.
    #[must_use]
    pub fn price_for(&self, args: &Value) -> f64 {
        match self {
            Self::Free => 0.0,
            Self::Fixed { usd } => *usd,
            Self::Dynamic {
                min_usd,
                max_usd,
                compute,
            } => {
                let computed = compute(args);
                if computed.is_finite() {
                    computed.clamp(*min_usd, *max_usd)
                } else {
                    *min_usd
                }
            }
        }
    }

    /// Returns the wire-level pricing advertisement for `tools/list`.
    #[must_use]
    pub fn advert(&self) -> PricingAdvert {
        match *self {
            Self::Free => PricingAdvert {
                model: "free".to_owned(),
                price_usd: None,
                min_usd: None,
                max_usd: None,
            },
            Self::Fixed { usd } => PricingAdvert {
                model: "fixed".to_owned(),
                price_usd: Some(usd),
                min_usd: None,
                max_usd: None,
            },
            Self::Dynamic { min_usd, max_usd, .. } => PricingAdvert {
                model: "dynamic".to_owned(),
                price_usd: None,
                min_usd: Some(min_usd),
                max_usd: Some(max_usd),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn by_level(args: &Value) -> f64 {
        match args.get("security_level").and_then(Value::as_str) {
            Some("enterprise") => 0.25,
            Some("enhanced") => 0.10,
            _ => 0.02,
        }
    }

    #[test]
    fn test_free_is_zero() {
        assert_eq!(Pricing::Free.price_for(&json!({})), 0.0);
    }

    #[test]
    fn test_fixed_ignores_args() {
        let pricing = Pricing::fixed(0.10);
        assert_eq!(pricing.price_for(&json!({})), 0.10);
        assert_eq!(pricing.price_for(&json!({"anything": 1})), 0.10);
    }

    #[test]
    fn test_dynamic_clamps_to_band() {
        fn huge(_: &Value) -> f64 {
            42.0
        }
        let pricing = Pricing::dynamic(0.02, 0.25, huge);
        assert_eq!(pricing.price_for(&json!({})), 0.25);
    }

    #[test]
    fn test_dynamic_computes_from_args() {
        let pricing = Pricing::dynamic(0.02, 0.25, by_level);
        assert_eq!(pricing.price_for(&json!({"security_level": "enhanced"})), 0.10);
        assert_eq!(pricing.price_for(&json!({})), 0.02);
    }

    #[test]
    fn test_dynamic_nan_falls_to_min() {
        fn bad(_: &Value) -> f64 {
            f64::NAN
        }
        let pricing = Pricing::dynamic(0.05, 0.50, bad);
        assert_eq!(pricing.price_for(&json!({})), 0.05);
    }

    #[test]
    fn test_validation_rejects_negative_fixed() {
        assert!(Pricing::fixed(-0.01).validate().is_err());
        assert!(Pricing::fixed(0.0).validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_inverted_band() {
        fn one(_: &Value) -> f64 {
            1.0
        }
        assert!(Pricing::dynamic(0.5, 0.1, one).validate().is_err());
        assert!(Pricing::dynamic(0.1, 0.5, one).validate().is_ok());
    }

    #[test]
    fn test_advert_shapes() {
        assert_eq!(Pricing::Free.advert().model, "free");
        let fixed = Pricing::fixed(0.10).advert();
        assert_eq!(fixed.model, "fixed");
        assert_eq!(fixed.price_usd, Some(0.10));
        let dynamic = Pricing::dynamic(0.02, 0.25, by_level).advert();
        assert_eq!(dynamic.min_usd, Some(0.02));
        assert_eq!(dynamic.max_usd, Some(0.25));
    }
}
