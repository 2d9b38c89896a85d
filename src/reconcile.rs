//! Desired-image computation and the up-to-date check.
//!
//! Images are compared as plain strings. Re-running with the same overrides
//! after a successful deploy therefore always finds every service up to date.

/// Image overrides given for one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageOverride {
    /// Replaces each service's registry as the image base.
    pub image: Option<String>,
    pub tag: Option<String>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("image {image} already carries a tag, refusing to append {tag}")]
pub struct AmbiguousTag {
    pub image: String,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    UpToDate,
    Stale { current: String, desired: String },
}

/// Prefixes `tag` with `:` unless it already starts with one.
pub fn normalize_tag(tag: &str) -> String {
    if tag.starts_with(':') {
        tag.to_string()
    } else {
        format!(":{}", tag)
    }
}

/// The full image reference a service should run.
pub fn desired_image(registry: &str, overrides: &ImageOverride) -> Result<String, AmbiguousTag> {
    let base = overrides.image.as_deref().unwrap_or(registry);

    let tag = match &overrides.tag {
        Some(tag) => tag,
        None => return Ok(base.to_string()),
    };

    // Any `:` in the base counts as an embedded tag, registry ports included.
    if base.contains(':') {
        return Err(AmbiguousTag {
            image: base.to_string(),
            tag: tag.clone(),
        });
    }

    Ok(format!("{}{}", base, normalize_tag(tag)))
}

pub fn decide(current: &str, desired: &str) -> Decision {
    if current == desired {
        Decision::UpToDate
    } else {
        Decision::Stale {
            current: current.to_string(),
            desired: desired.to_string(),
        }
    }
}
