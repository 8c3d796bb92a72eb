// src/core/rules/links.rs

//! Renders configured link templates into concrete event links.

use crate::config::LinkSetting;
use crate::core::alert::AlertLink;

/// Values substituted into link templates.
#[derive(Debug, Clone, Default)]
pub struct LinkValues<'a> {
    pub pod_name: &'a str,
    pub pod_namespace: &'a str,
    pub node_name: &'a str,
}

/// Renders each template, substituting `{{pod_name}}`, `{{pod_namespace}}`
/// and `{{node_name}}`. Templates that render empty or keep an unresolved
/// placeholder are silently dropped.
pub fn render_links(templates: &[LinkSetting], values: &LinkValues<'_>) -> Vec<AlertLink> {
    templates
        .iter()
        .filter_map(|template| {
            let href = template
                .href
                .replace("{{pod_name}}", values.pod_name)
                .replace("{{pod_namespace}}", values.pod_namespace)
                .replace("{{node_name}}", values.node_name);
            if href.trim().is_empty() || href.contains("{{") {
                return None;
            }
            Some(AlertLink {
                text: template.name.clone(),
                href,
            })
        })
        .collect()
}
