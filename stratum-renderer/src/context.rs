//! Template context — serializable rendering payload for project and service templates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stratum_core::{ProjectName, ServiceName};

use crate::error::RenderError;

/// Rendering payload handed to every template file and templated path.
///
/// Deliberately free of timestamps: rendering the same template with the same
/// context must produce byte-identical output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderContext {
    pub project_name: String,
    /// Set only when rendering a service template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    /// Every service bootstrapped so far, in lock order.
    pub services: Vec<String>,
    pub template_version: u32,
    pub stratum_version: String,
    /// Free-form `--data key=value` pairs, also exposed at the top level.
    pub data: BTreeMap<String, String>,
}

impl RenderContext {
    /// Context for the root project template.
    pub fn for_project(
        project: &ProjectName,
        services: &[ServiceName],
        template_version: u32,
    ) -> Self {
        RenderContext {
            project_name: project.to_string(),
            service_name: None,
            services: services.iter().map(|s| s.to_string()).collect(),
            template_version,
            stratum_version: env!("CARGO_PKG_VERSION").to_string(),
            data: BTreeMap::new(),
        }
    }

    /// Derive the context for a single service template.
    pub fn for_service(&self, service: &ServiceName) -> Self {
        RenderContext {
            service_name: Some(service.to_string()),
            ..self.clone()
        }
    }

    pub fn with_data(mut self, data: BTreeMap<String, String>) -> Self {
        self.data = data;
        self
    }

    /// Convert to a [`tera::Context`] for rendering.
    ///
    /// `data` entries are inserted at the top level unless they collide with
    /// a recognised key, which always wins.
    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        let mut ctx = tera::Context::new();
        for (key, value) in &self.data {
            ctx.insert(key.as_str(), value);
        }
        ctx.extend(tera::Context::from_serialize(self).map_err(RenderError::Context)?);
        Ok(ctx)
    }
}
