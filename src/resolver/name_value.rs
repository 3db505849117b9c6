//! Missing-value fallbacks shared by the name/value resolvers.

use crate::error::{BindError, WebError};
use crate::handler::{ArgValue, Param};

/// What a name/value resolver does when the request carries no value.
#[derive(Debug, Clone)]
pub enum Fallback {
    /// Use this (already converted) value.
    Value(ArgValue),
    /// Fail with "missing required value: NAME".
    Required,
}

/// Name, required flag and absent-value policy of a parameter, derived once
/// when its resolver is built.
///
/// Precedence for an absent value: the configured default (converted here,
/// once), then the required check, then the type's empty value (`None` for
/// options, an empty list, `T::default()`, or null).
#[derive(Debug, Clone)]
pub struct NameAndValue {
    name: String,
    required: bool,
    fallback: Fallback,
}

impl NameAndValue {
    /// # Errors
    ///
    /// Returns [`BindError::InvalidDefault`] if the default cannot be
    /// converted to the parameter's type.
    pub fn for_param(param: &Param) -> Result<Self, BindError> {
        let fallback = match param.default() {
            Some(default) => {
                let value = param
                    .ty()
                    .convert(&[default.to_owned()])
                    .map_err(|reason| BindError::InvalidDefault {
                        name: param.name().to_owned(),
                        value: default.to_owned(),
                        reason,
                    })?;
                Fallback::Value(value)
            }
            None if param.is_required() => Fallback::Required,
            None => Fallback::Value(param.ty().empty_value()),
        };
        Ok(Self {
            name: param.name().to_owned(),
            required: param.is_required(),
            fallback,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn fallback(&self) -> &Fallback {
        &self.fallback
    }

    /// The value to use when the request has none.
    pub fn on_absent(&self) -> Result<ArgValue, WebError> {
        match &self.fallback {
            Fallback::Value(value) => Ok(value.clone()),
            Fallback::Required => Err(WebError::BadRequest(format!(
                "missing required value: {}",
                self.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::ParamType;

    #[test]
    fn default_is_converted_once() {
        let param = Param::query("page", ParamType::of::<u32>()).default_value("3");
        let nv = NameAndValue::for_param(&param).unwrap();
        assert!(matches!(nv.fallback(), Fallback::Value(_)));
        assert_eq!(nv.on_absent().unwrap().get::<u32>(), Some(3));
    }

    #[test]
    fn default_wins_over_required() {
        let param = Param::query("q", ParamType::of::<String>())
            .required(true)
            .default_value("all");
        let nv = NameAndValue::for_param(&param).unwrap();
        assert_eq!(nv.on_absent().unwrap().get::<String>().as_deref(), Some("all"));
    }

    #[test]
    fn required_without_default() {
        let nv = NameAndValue::for_param(&Param::header("X-Id", ParamType::of::<u64>())).unwrap();
        assert!(nv.is_required());
        assert_eq!(
            nv.on_absent().unwrap_err().to_string(),
            "missing required value: X-Id"
        );
    }

    #[test]
    fn optional_wrapper_is_empty() {
        let nv = NameAndValue::for_param(&Param::query("q", ParamType::optional::<i32>())).unwrap();
        assert_eq!(nv.on_absent().unwrap().get::<Option<i32>>(), Some(None));
    }

    #[test]
    fn not_required_uses_zero_value() {
        let param = Param::query("n", ParamType::of::<i32>()).required(false);
        let nv = NameAndValue::for_param(&param).unwrap();
        assert_eq!(nv.on_absent().unwrap().get::<i32>(), Some(0));
    }

    #[test]
    fn unconvertible_default() {
        let param = Param::query("n", ParamType::of::<i32>()).default_value("x");
        assert!(matches!(
            NameAndValue::for_param(&param),
            Err(BindError::InvalidDefault { .. })
        ));
    }

    #[test]
    fn optional_with_default() {
        let param = Param::query("n", ParamType::optional::<i32>()).default_value("5");
        let nv = NameAndValue::for_param(&param).unwrap();
        assert_eq!(nv.on_absent().unwrap().get::<Option<i32>>(), Some(Some(5)));
    }
}
