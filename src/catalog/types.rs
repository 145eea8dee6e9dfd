/// A named permission group as written in the catalog file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDef {
    pub name: String,
    pub permissions: Vec<String>,
}

/// A customer profile (e.g. "personal", "business"). Permissions from two
/// different profiles cannot be requested in the same consent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDef {
    pub name: String,
    pub permissions: Vec<String>,
}

/// Intermediate result from parsing a single KDL catalog document.
#[derive(Debug, Clone, Default)]
pub struct ParsedCatalog {
    pub permissions: Vec<String>,
    pub groups: Vec<GroupDef>,
    pub profiles: Vec<ProfileDef>,
}
