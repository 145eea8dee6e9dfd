use crate::catalog::errors::CatalogError;
use crate::catalog::types::*;
use kdl::KdlDocument;

/// Parse a KDL catalog document into its raw definitions.
pub fn parse_kdl_document(source: &str) -> Result<ParsedCatalog, CatalogError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| CatalogError::KdlParse(e.to_string()))?;

    let mut catalog = ParsedCatalog::default();

    for node in doc.nodes() {
        match node.name().value() {
            "permissions" => {
                catalog.permissions.extend(dash_list(node));
            }
            "group" => {
                let name = first_string_arg(node).ok_or_else(|| {
                    CatalogError::InvalidCatalog(
                        "group node requires a string argument (e.g. group \"balances\")".into(),
                    )
                })?;
                let permissions = dash_list(node);
                if permissions.is_empty() {
                    return Err(CatalogError::InvalidCatalog(format!(
                        "group `{name}` does not list any permission"
                    )));
                }
                catalog.groups.push(GroupDef { name, permissions });
            }
            "profile" => {
                let name = first_string_arg(node).ok_or_else(|| {
                    CatalogError::InvalidCatalog(
                        "profile node requires a string argument (e.g. profile \"personal\")"
                            .into(),
                    )
                })?;
                catalog.profiles.push(ProfileDef {
                    name,
                    permissions: dash_list(node),
                });
            }
            other => {
                tracing::warn!("ignoring unknown top-level catalog node `{other}`");
            }
        }
    }

    Ok(catalog)
}

fn first_string_arg(node: &kdl::KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// Collect the string arguments of the `-` children of a node:
/// ```kdl
/// group "balances" {
///     - "ACCOUNTS_READ"
///     - "RESOURCES_READ"
/// }
/// ```
fn dash_list(node: &kdl::KdlNode) -> Vec<String> {
    let Some(children) = node.children() else {
        return Vec::new();
    };
    children
        .nodes()
        .iter()
        .filter(|n| n.name().value() == "-")
        .filter_map(first_string_arg)
        .collect()
}
