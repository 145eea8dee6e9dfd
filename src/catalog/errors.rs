use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error("Failed to load permission catalog `{path}`")]
    #[diagnostic(
        code(lodestar::catalog::load),
        help("Check that the file exists and contains valid KDL syntax")
    )]
    LoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid permission catalog: {0}")]
    #[diagnostic(
        code(lodestar::catalog::invalid),
        help("A catalog contains one `permissions` node plus `group` and `profile` nodes")
    )]
    InvalidCatalog(String),

    #[error("Permission `{permission}` used by {owner} is not declared")]
    #[diagnostic(
        code(lodestar::catalog::undefined_permission),
        help("Add the code to the top-level `permissions {{ - \"CODE\" }}` list")
    )]
    UndefinedPermission { permission: String, owner: String },

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(lodestar::catalog::kdl_parse),
        help("Check your KDL file syntax against https://kdl.dev for the specification")
    )]
    KdlParse(String),
}
