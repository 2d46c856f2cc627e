//! Image catalog extraction from deployment templates.
//!
//! The platform templates declare the images they need as parameter
//! pairs: a `*_IMAGE` parameter naming the image, immediately followed
//! by a `*_IMAGE_VERSION` parameter carrying the tag.

use serde::Deserialize;
use std::fmt;
use std::path::Path;

use crate::config::Config;
use crate::error::{CuppaError, Result};

const IMAGE_SUFFIX: &str = "_IMAGE";
const VERSION_SUFFIX: &str = "_IMAGE_VERSION";

/// Template files holding the image catalog, relative to the
/// `generated` directory of the core templates checkout.
pub const CORE_TIER_TEMPLATES: [&str; 4] = [
    "fh-core-infra.json",
    "fh-core-backend.json",
    "fh-core-frontend.json",
    "fh-core-monitoring.json",
];

/// A fully qualified image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub name: String,
    pub tag: String,
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

#[derive(Debug, Deserialize)]
struct TemplateObject {
    #[serde(default)]
    parameters: Vec<TemplateParameter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateParameter {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Walk the parameter list in declared order and pair every image with
/// the version parameter that directly follows it. A version without a
/// preceding image, or an image without a following version, is an
/// error.
pub fn pair_image_parameters(parameters: &[TemplateParameter]) -> Result<Vec<ImageReference>> {
    let mut images = Vec::new();
    let mut pending: Option<&TemplateParameter> = None;

    for param in parameters {
        if param.name.ends_with(VERSION_SUFFIX) {
            match pending.take() {
                Some(image) => images.push(ImageReference {
                    name: image.value.clone(),
                    tag: param.value.clone(),
                }),
                None => {
                    return Err(CuppaError::UnpairedImageParameter {
                        parameter: param.name.clone(),
                    })
                }
            }
        } else if param.name.ends_with(IMAGE_SUFFIX) {
            if let Some(previous) = pending.replace(param) {
                return Err(CuppaError::UnpairedImageParameter {
                    parameter: previous.name.clone(),
                });
            }
        }
    }

    if let Some(trailing) = pending {
        return Err(CuppaError::UnpairedImageParameter {
            parameter: trailing.name.clone(),
        });
    }

    Ok(images)
}

/// Extract the image references declared by a single template file.
pub fn read_template_images(path: &Path) -> Result<Vec<ImageReference>> {
    let body = std::fs::read_to_string(path).map_err(|e| CuppaError::TemplateRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let template: TemplateObject =
        serde_json::from_str(&body).map_err(|e| CuppaError::TemplateParse {
            path: path.to_path_buf(),
            source: e,
        })?;

    pair_image_parameters(&template.parameters)
}

/// The full image catalog across all core tier templates.
pub fn platform_images(config: &Config) -> Result<Vec<ImageReference>> {
    let generated = config.core.templates.join("generated");
    let mut catalog = Vec::new();

    for template in CORE_TIER_TEMPLATES {
        catalog.extend(read_template_images(&generated.join(template))?);
    }

    Ok(catalog)
}
