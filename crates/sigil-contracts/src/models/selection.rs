use std::fmt;

use anyhow::bail;

use super::registry::{Capability, ModelRegistry, ModelSpec};

/// Why the resolved model differs from what was asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fallback {
    Unspecified,
    Unknown { requested: String },
    Unsupported { requested: String, capability: Capability },
}

impl fmt::Display for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fallback::Unspecified => f.write_str("no model requested; using the default"),
            Fallback::Unknown { requested } => write!(f, "model '{requested}' is not known"),
            Fallback::Unsupported {
                requested,
                capability,
            } => write!(f, "model '{requested}' cannot {capability}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub fallback: Option<Fallback>,
}

impl ModelRegistry {
    /// Picks the requested model when it can serve `capability`, otherwise the
    /// first registered model that can.
    pub fn resolve(
        &self,
        requested: Option<&str>,
        capability: Capability,
    ) -> anyhow::Result<ModelSelection> {
        let requested = requested.map(str::trim).filter(|name| !name.is_empty());
        let fallback = match requested {
            None => Fallback::Unspecified,
            Some(name) => match self.get(name) {
                Some(model) if model.supports(capability) => {
                    return Ok(ModelSelection {
                        model: model.clone(),
                        fallback: None,
                    });
                }
                Some(_) => Fallback::Unsupported {
                    requested: name.to_string(),
                    capability,
                },
                None => Fallback::Unknown {
                    requested: name.to_string(),
                },
            },
        };

        let Some(model) = self.supporting(capability).next() else {
            bail!("no registered model can {capability}");
        };
        Ok(ModelSelection {
            model: model.clone(),
            fallback: Some(fallback),
        })
    }
}
