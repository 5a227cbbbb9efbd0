use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::core::ElementId;
use crate::recipe::externalize::ExternalDataRef;
use crate::recipe::ops::Operation;
use crate::recipe::value::ArgValue;

/// Storage of one positional argument: fully inline or one external ref.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgSlot {
    Inline(ArgValue),
    External(ExternalDataRef),
}

impl ArgSlot {
    #[must_use]
    pub fn inline(&self) -> Option<&ArgValue> {
        match self {
            Self::Inline(value) => Some(value),
            Self::External(_) => None,
        }
    }

    #[must_use]
    pub fn external(&self) -> Option<&ExternalDataRef> {
        match self {
            Self::External(data_ref) => Some(data_ref),
            Self::Inline(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CallArgRepr", into = "CallArgRepr")]
pub struct CallArg {
    pub name: String,
    pub value: ArgSlot,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CallArgRepr {
    name: String,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    value: Option<ArgValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data_ref: Option<ExternalDataRef>,
}

// `"value": null` is an explicit Null argument, not an absent one.
fn deserialize_present<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<ArgValue>, D::Error> {
    ArgValue::deserialize(deserializer).map(Some)
}

impl From<CallArg> for CallArgRepr {
    fn from(arg: CallArg) -> Self {
        match arg.value {
            ArgSlot::Inline(value) => Self {
                name: arg.name,
                value: Some(value),
                data_ref: None,
            },
            ArgSlot::External(data_ref) => Self {
                name: arg.name,
                value: None,
                data_ref: Some(data_ref),
            },
        }
    }
}

impl TryFrom<CallArgRepr> for CallArg {
    type Error = String;

    fn try_from(repr: CallArgRepr) -> Result<Self, Self::Error> {
        let value = match (repr.value, repr.data_ref) {
            (Some(value), None) => ArgSlot::Inline(value),
            (None, Some(data_ref)) => ArgSlot::External(data_ref),
            (Some(_), Some(_)) => {
                return Err(format!(
                    "argument `{}` mixes an inline value with a data_ref",
                    repr.name
                ));
            }
            (None, None) => {
                return Err(format!("argument `{}` has neither value nor data_ref", repr.name));
            }
        };
        Ok(Self {
            name: repr.name,
            value,
        })
    }
}

/// One recorded drawing or decoration operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub id: ElementId,
    pub op: Operation,
    #[serde(default)]
    pub args: Vec<CallArg>,
    #[serde(default)]
    pub kwargs: IndexMap<String, ArgValue>,
    pub seq: u64,
    /// Explicit draw priority; `None` falls back to the operation default.
    #[serde(rename = "zorder", default, skip_serializing_if = "Option::is_none")]
    pub z_order: Option<i32>,
}

impl Call {
    #[must_use]
    pub fn z_order(&self) -> i32 {
        self.z_order.unwrap_or_else(|| self.op.default_z_order())
    }

    #[must_use]
    pub fn arg(&self, name: &str) -> Option<&ArgSlot> {
        self.args
            .iter()
            .find(|arg| arg.name == name)
            .map(|arg| &arg.value)
    }

    #[must_use]
    pub fn positional(&self, index: usize) -> Option<&ArgSlot> {
        self.args.get(index).map(|arg| &arg.value)
    }

    #[must_use]
    pub fn kwarg(&self, name: &str) -> Option<&ArgValue> {
        self.kwargs.get(name)
    }

    pub fn external_refs(&self) -> impl Iterator<Item = (&str, &ExternalDataRef)> {
        self.args
            .iter()
            .filter_map(|arg| arg.value.external().map(|data_ref| (arg.name.as_str(), data_ref)))
    }
}
