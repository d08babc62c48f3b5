use crate::error::ConfigurationError;
use crate::tags::{MatrixTagId, TagRegistry, VectorTagId, VectorTagType, NONTIME_TAG, SYSTEM_TAG};
use crate::Real;
use serde::{Deserialize, Serialize};

/// The tags an object contributes to, given by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagSelection {
    pub vector_tags: Vec<String>,
    pub matrix_tags: Vec<String>,
    /// Residual tags that receive the absolute value of every residual entry.
    pub abs_value_vector_tags: Vec<String>,
    /// Factor applied to every contribution.
    pub scaling: f64,
}

impl Default for TagSelection {
    fn default() -> Self {
        Self {
            vector_tags: vec![NONTIME_TAG.to_string()],
            matrix_tags: vec![SYSTEM_TAG.to_string()],
            abs_value_vector_tags: Vec::new(),
            scaling: 1.0,
        }
    }
}

impl TagSelection {
    pub fn with_vector_tags<S: Into<String>>(self, tags: impl IntoIterator<Item = S>) -> Self {
        Self {
            vector_tags: tags.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn with_matrix_tags<S: Into<String>>(self, tags: impl IntoIterator<Item = S>) -> Self {
        Self {
            matrix_tags: tags.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn with_abs_value_vector_tags<S: Into<String>>(self, tags: impl IntoIterator<Item = S>) -> Self {
        Self {
            abs_value_vector_tags: tags.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn with_scaling(self, scaling: f64) -> Self {
        Self { scaling, ..self }
    }

    /// Resolve the tag names against `registry` on behalf of `object`.
    ///
    /// Every vector tag must be a registered residual tag and every matrix tag a registered
    /// matrix tag.
    pub fn resolve<T: Real>(&self, object: &str, registry: &TagRegistry) -> eyre::Result<ResolvedTags<T>> {
        let residual_tag = |name: &String| -> eyre::Result<VectorTagId> {
            let id = registry
                .vector_tag_id(name)
                .map_err(|_| ConfigurationError::UnknownTag {
                    object: object.to_string(),
                    tag: name.clone(),
                })?;
            if registry.vector_tag_type(id) != VectorTagType::Residual {
                return Err(ConfigurationError::TagKindMismatch {
                    tag: registry.vector_tag_name(id).to_string(),
                    existing: "solution",
                    requested: "residual",
                }
                .into());
            }
            Ok(id)
        };
        let matrix_tag = |name: &String| -> eyre::Result<MatrixTagId> {
            let id = registry
                .matrix_tag_id(name)
                .map_err(|_| ConfigurationError::UnknownTag {
                    object: object.to_string(),
                    tag: name.clone(),
                })?;
            Ok(id)
        };

        let scaling = T::from_f64(self.scaling).ok_or_else(|| ConfigurationError::InvalidParameter {
            object: object.to_string(),
            parameter: "scaling".to_string(),
            reason: format!("{} is not representable", self.scaling),
        })?;

        Ok(ResolvedTags {
            vector_tags: self
                .vector_tags
                .iter()
                .map(residual_tag)
                .collect::<eyre::Result<_>>()?,
            matrix_tags: self
                .matrix_tags
                .iter()
                .map(matrix_tag)
                .collect::<eyre::Result<_>>()?,
            abs_value_vector_tags: self
                .abs_value_vector_tags
                .iter()
                .map(residual_tag)
                .collect::<eyre::Result<_>>()?,
            scaling,
        })
    }
}

/// A [`TagSelection`] resolved to tag ids.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTags<T> {
    vector_tags: Vec<VectorTagId>,
    matrix_tags: Vec<MatrixTagId>,
    abs_value_vector_tags: Vec<VectorTagId>,
    scaling: T,
}

impl<T: Real> ResolvedTags<T> {
    pub fn new(vector_tags: Vec<VectorTagId>, matrix_tags: Vec<MatrixTagId>, scaling: T) -> Self {
        Self {
            vector_tags,
            matrix_tags,
            abs_value_vector_tags: Vec::new(),
            scaling,
        }
    }

    pub fn with_abs_value_vector_tags(self, abs_value_vector_tags: Vec<VectorTagId>) -> Self {
        Self {
            abs_value_vector_tags,
            ..self
        }
    }

    pub fn vector_tags(&self) -> &[VectorTagId] {
        &self.vector_tags
    }

    pub fn matrix_tags(&self) -> &[MatrixTagId] {
        &self.matrix_tags
    }

    pub fn abs_value_vector_tags(&self) -> &[VectorTagId] {
        &self.abs_value_vector_tags
    }

    pub fn scaling(&self) -> T {
        self.scaling
    }
}
