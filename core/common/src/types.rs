//! Common types used throughout OneIndex.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters escaped inside a single URL path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Percent-encode one path segment for use in a Graph URL.
pub fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

/// Selects which drive a request targets.
///
/// Site mode wins whenever `site_id` is set; otherwise the drive belongs to
/// `user_id`, or to the signed-in account ("me") when no user is given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveContext {
    /// SharePoint site identifier.
    #[serde(default)]
    pub site_id: Option<String>,
    /// User principal name or object id.
    #[serde(default)]
    pub user_id: Option<String>,
}

impl DriveContext {
    /// The signed-in account's own drive.
    pub fn me() -> Self {
        Self::default()
    }

    /// The document library of a site.
    pub fn site(site_id: impl Into<String>) -> Self {
        Self {
            site_id: Some(site_id.into()),
            user_id: None,
        }
    }

    /// Another user's drive.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            site_id: None,
            user_id: Some(user_id.into()),
        }
    }

    /// Root path prefixing every drive operation for this context.
    ///
    /// Empty ids count as absent.
    pub fn root_path(&self) -> String {
        if let Some(site_id) = self.site_id.as_deref().filter(|s| !s.is_empty()) {
            return format!("/sites/{}/drive/root", site_id);
        }

        match self.user_id.as_deref() {
            None | Some("") | Some("me") => "/me/drive/root".to_string(),
            Some(user_id) => format!("/users/{}/drive/root", user_id),
        }
    }
}

/// An item path inside a drive, relative to the drive root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DrivePath {
    components: Vec<String>,
}

impl DrivePath {
    /// Create a root path.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Parse a path string. Empty segments are dropped, so `"/"`, `""` and
    /// `"//"` all denote the root.
    pub fn parse(path: &str) -> Self {
        let components = path
            .split('/')
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect();
        Self { components }
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Get the item name (last component).
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    /// Get the path components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Path without leading or trailing separators.
    pub fn as_relative(&self) -> String {
        self.components.join("/")
    }

    /// Relative path with every segment percent-encoded.
    pub fn encoded(&self) -> String {
        self.components
            .iter()
            .map(|c| encode_segment(c))
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl From<&str> for DrivePath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

impl fmt::Display for DrivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.as_relative())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_me_root() {
        assert_eq!(DriveContext::me().root_path(), "/me/drive/root");
        assert_eq!(DriveContext::user("me").root_path(), "/me/drive/root");
    }

    #[test]
    fn test_user_root() {
        assert_eq!(
            DriveContext::user("alice").root_path(),
            "/users/alice/drive/root"
        );
    }

    #[test]
    fn test_site_takes_precedence() {
        let ctx = DriveContext {
            site_id: Some("contoso".to_string()),
            user_id: Some("alice".to_string()),
        };
        assert_eq!(ctx.root_path(), "/sites/contoso/drive/root");
    }

    #[test]
    fn test_empty_ids_fall_through() {
        assert_eq!(DriveContext::site("").root_path(), "/me/drive/root");
        assert_eq!(DriveContext::user("").root_path(), "/me/drive/root");

        let ctx = DriveContext {
            site_id: Some(String::new()),
            user_id: Some("alice".to_string()),
        };
        assert_eq!(ctx.root_path(), "/users/alice/drive/root");
    }

    #[test]
    fn test_drive_path_root_forms() {
        assert!(DrivePath::parse("").is_root());
        assert!(DrivePath::parse("/").is_root());
        assert!(DrivePath::parse("//").is_root());
        assert_eq!(DrivePath::root().to_string(), "/");
    }

    #[test]
    fn test_drive_path_parse() {
        let path = DrivePath::parse("/docs/2024/report.pdf/");
        assert_eq!(path.components(), &["docs", "2024", "report.pdf"]);
        assert_eq!(path.as_relative(), "docs/2024/report.pdf");
        assert_eq!(path.name(), Some("report.pdf"));
    }

    #[test]
    fn test_drive_path_encoding() {
        let path = DrivePath::parse("/my docs/a#b?.txt");
        assert_eq!(path.encoded(), "my%20docs/a%23b%3F.txt");

        let path = DrivePath::parse("/café");
        assert_eq!(path.encoded(), "caf%C3%A9");
    }

    proptest! {
        #[test]
        fn prop_site_always_wins(site in "[a-zA-Z0-9,.-]{1,24}", user in proptest::option::of("[a-z]{1,12}")) {
            let ctx = DriveContext { site_id: Some(site.clone()), user_id: user };
            prop_assert_eq!(ctx.root_path(), format!("/sites/{}/drive/root", site));
        }

        #[test]
        fn prop_named_user_root(user in "[a-z][a-z0-9.]{0,15}") {
            prop_assume!(user != "me");
            let ctx = DriveContext::user(user.clone());
            prop_assert_eq!(ctx.root_path(), format!("/users/{}/drive/root", user));
        }

        #[test]
        fn prop_parse_never_keeps_empty_segments(path in "[a-z/]{0,32}") {
            let parsed = DrivePath::parse(&path);
            prop_assert!(parsed.components().iter().all(|c| !c.is_empty()));
        }
    }
}
