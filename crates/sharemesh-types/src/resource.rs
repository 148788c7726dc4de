//! Resource records and the rules used to match them against templates.
//!
//! A [`Resource`] is identified by the triple `(channel, uri, owner)`. The
//! same type doubles as a *template* for QUERY, FETCH and SUBSCRIBE, where
//! empty fields act as wildcards according to [`Resource::matches`].

use crate::error::{SharemeshError, SharemeshResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Owner value written into results to hide the publisher's identity.
/// Never accepted as input.
pub const ANONYMOUS_OWNER: &str = "*";

/// URI scheme of resources backed by a file on the serving host.
pub const FILE_SCHEME: &str = "file";

/// A named resource in the shared directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resource {
    /// Human-readable name, substring-matched by templates.
    pub name: String,
    /// Free-form tags, matched case-insensitively.
    pub tags: Vec<String>,
    /// Free-form description, substring-matched by templates.
    pub description: String,
    /// Absolute URI. Empty only in templates, where it means "any".
    pub uri: String,
    /// Channel name. Empty is the default channel, not a wildcard.
    pub channel: String,
    /// Publisher identity. Empty is anonymous.
    pub owner: String,
    /// `host:port` of the server that registered this resource.
    #[serde(rename = "ezserver")]
    pub server_owner: Option<String>,
    /// Byte length of the backing file, only set on FETCH metadata.
    #[serde(rename = "resourceSize", skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl Resource {
    /// Parse and normalise a resource or template object received on the wire.
    ///
    /// Missing fields default to empty. String values are trimmed and any
    /// `\0` characters are removed. Wrongly typed fields are rejected.
    pub fn from_value(value: &serde_json::Value) -> SharemeshResult<Self> {
        if !value.is_object() {
            return Err(SharemeshError::InvalidResource(
                "resource must be a JSON object".to_string(),
            ));
        }
        let mut resource: Resource = serde_json::from_value(value.clone())
            .map_err(|e| SharemeshError::InvalidResource(e.to_string()))?;
        resource.normalize();
        Ok(resource)
    }

    fn normalize(&mut self) {
        self.name = clean(&self.name);
        self.description = clean(&self.description);
        self.uri = clean(&self.uri);
        self.channel = clean(&self.channel);
        self.owner = clean(&self.owner);
        self.server_owner = self.server_owner.as_deref().map(clean);
        self.tags = self
            .tags
            .iter()
            .map(|t| clean(t))
            .filter(|t| !t.is_empty())
            .collect();
    }

    /// Serialize to a JSON object.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Whether the owner is the reserved anonymisation marker.
    pub fn has_reserved_owner(&self) -> bool {
        self.owner == ANONYMOUS_OWNER
    }

    /// The parsed URI, if it is absolute.
    pub fn absolute_uri(&self) -> Option<Url> {
        Url::parse(&self.uri).ok()
    }

    /// Whether the URI is an absolute `file:` URI with no authority component.
    ///
    /// Decided on the raw text: the parser folds `file://localhost/p` into an
    /// empty host, which would otherwise pass as local.
    pub fn is_local_file_uri(&self) -> bool {
        match self.absolute_uri() {
            Some(url) if url.scheme() == FILE_SCHEME => {}
            _ => return false,
        }
        let Some(rest) = self.uri.get(FILE_SCHEME.len() + 1..) else {
            return false;
        };
        match rest.strip_prefix("//") {
            Some(after_authority) => after_authority.starts_with('/'),
            None => rest.starts_with('/'),
        }
    }

    /// Path on this host referenced by a local `file:` URI.
    pub fn local_path(&self) -> Option<PathBuf> {
        if !self.is_local_file_uri() {
            return None;
        }
        self.absolute_uri()?.to_file_path().ok()
    }

    /// Same `(channel, uri)` slot.
    pub fn same_slot(&self, other: &Resource) -> bool {
        self.channel == other.channel && self.uri == other.uri
    }

    /// Same `(channel, uri, owner)` identity.
    pub fn same_identity(&self, other: &Resource) -> bool {
        self.same_slot(other) && self.owner == other.owner
    }

    /// Match `candidate` against this template using the QUERY rule.
    ///
    /// Every template tag must be present on the candidate.
    pub fn matches(&self, candidate: &Resource) -> bool {
        let tags = self.tags.is_empty() || {
            let have = lowercase(&candidate.tags);
            self.tags.iter().all(|t| have.contains(&t.to_lowercase()))
        };
        tags && self.matches_common(candidate)
    }

    /// Match `candidate` against this template using the live-update rule
    /// applied to subscriptions.
    ///
    /// Unlike [`Resource::matches`], a single shared tag is enough.
    pub fn matches_update(&self, candidate: &Resource) -> bool {
        let tags = self.tags.is_empty() || {
            let have = lowercase(&candidate.tags);
            self.tags.iter().any(|t| have.contains(&t.to_lowercase()))
        };
        tags && self.matches_common(candidate)
    }

    fn matches_common(&self, candidate: &Resource) -> bool {
        if self.channel != candidate.channel {
            return false;
        }
        if !self.owner.is_empty() && self.owner != candidate.owner {
            return false;
        }
        if !self.uri.is_empty() && self.uri != candidate.uri {
            return false;
        }
        if self.name.is_empty() && self.description.is_empty() {
            true
        } else if !self.name.is_empty() {
            candidate.name.contains(&self.name)
        } else {
            candidate.description.contains(&self.description)
        }
    }

    /// Copy with a non-empty owner replaced by [`ANONYMOUS_OWNER`].
    pub fn anonymized(&self) -> Resource {
        let mut copy = self.clone();
        if !copy.owner.is_empty() {
            copy.owner = ANONYMOUS_OWNER.to_string();
        }
        copy
    }
}

fn clean(s: &str) -> String {
    s.replace('\0', "").trim().to_string()
}

fn lowercase(tags: &[String]) -> Vec<String> {
    tags.iter().map(|t| t.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource(channel: &str, uri: &str, owner: &str, name: &str, tags: &[&str]) -> Resource {
        Resource {
            name: name.to_string(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            description: String::new(),
            uri: uri.to_string(),
            channel: channel.to_string(),
            owner: owner.to_string(),
            server_owner: None,
            size: None,
        }
    }

    #[test]
    fn test_wire_field_names() {
        let mut r = resource("", "ftp://x/1", "alice", "doc", &["a"]);
        r.server_owner = Some("localhost:3000".to_string());
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["ezserver"], "localhost:3000");
        assert!(json.get("resourceSize").is_none());

        r.size = Some(12);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["resourceSize"], 12);
    }

    #[test]
    fn test_from_value_normalizes_strings() {
        let value = json!({
            "name": "  report\u{0} ",
            "tags": [" A ", "", "b"],
            "uri": " ftp://x/1 ",
            "owner": "bob"
        });
        let r = Resource::from_value(&value).unwrap();
        assert_eq!(r.name, "report");
        assert_eq!(r.tags, vec!["A".to_string(), "b".to_string()]);
        assert_eq!(r.uri, "ftp://x/1");
        assert_eq!(r.channel, "");
        assert_eq!(r.server_owner, None);
    }

    #[test]
    fn test_from_value_rejects_bad_types() {
        assert!(Resource::from_value(&json!("not an object")).is_err());
        assert!(Resource::from_value(&json!({"name": 5})).is_err());
        assert!(Resource::from_value(&json!({"tags": "a,b"})).is_err());
        assert!(Resource::from_value(&json!({"tags": [1, 2]})).is_err());
    }

    #[test]
    fn test_json_roundtrip_is_stable() {
        let mut r = resource("news", "http://example.com/a", "carol", "A", &["x", "y"]);
        r.description = "first".to_string();
        r.server_owner = Some("host:3781".to_string());
        let first = serde_json::to_string(&r).unwrap();
        let parsed = Resource::from_value(&serde_json::from_str(&first).unwrap()).unwrap();
        assert_eq!(serde_json::to_string(&parsed).unwrap(), first);
    }

    #[test]
    fn test_uri_shapes() {
        let r = resource("", "file:///tmp/a.txt", "", "", &[]);
        assert!(r.is_local_file_uri());
        assert_eq!(r.local_path(), Some(PathBuf::from("/tmp/a.txt")));

        let single_slash = resource("", "file:/tmp/a.txt", "", "", &[]);
        assert!(single_slash.is_local_file_uri());
        assert_eq!(single_slash.local_path(), Some(PathBuf::from("/tmp/a.txt")));

        let remote = resource("", "file://host/tmp/a.txt", "", "", &[]);
        assert!(!remote.is_local_file_uri());

        let localhost = resource("", "file://localhost/etc/hosts", "", "", &[]);
        assert!(!localhost.is_local_file_uri());
        assert_eq!(localhost.local_path(), None);

        let with_user = resource("", "file://user@/tmp/a.txt", "", "", &[]);
        assert!(!with_user.is_local_file_uri());

        let http = resource("", "http://example.com/a.txt", "", "", &[]);
        assert!(!http.is_local_file_uri());

        let relative = resource("", "tmp/a.txt", "", "", &[]);
        assert!(relative.absolute_uri().is_none());
        assert!(!relative.is_local_file_uri());
    }

    #[test]
    fn test_query_match_requires_all_tags() {
        let stored = resource("", "ftp://x/1", "alice", "doc", &["a", "b"]);
        assert!(resource("", "", "", "", &["A"]).matches(&stored));
        assert!(resource("", "", "", "", &["a", "B"]).matches(&stored));
        assert!(!resource("", "", "", "", &["a", "c"]).matches(&stored));
    }

    #[test]
    fn test_update_match_accepts_any_tag() {
        let stored = resource("", "ftp://x/1", "alice", "doc", &["a", "b"]);
        let template = resource("", "", "", "", &["a", "c"]);
        assert!(template.matches_update(&stored));
        assert!(!template.matches(&stored));
        assert!(!resource("", "", "", "", &["z"]).matches_update(&stored));
    }

    #[test]
    fn test_channel_is_not_a_wildcard() {
        let stored = resource("private", "ftp://x/1", "", "", &[]);
        assert!(!resource("", "", "", "", &[]).matches(&stored));
        assert!(resource("private", "", "", "", &[]).matches(&stored));
    }

    #[test]
    fn test_owner_and_uri_clauses() {
        let stored = resource("", "ftp://x/1", "alice", "", &[]);
        assert!(resource("", "", "alice", "", &[]).matches(&stored));
        assert!(!resource("", "", "bob", "", &[]).matches(&stored));
        assert!(resource("", "ftp://x/1", "", "", &[]).matches(&stored));
        assert!(!resource("", "ftp://x/2", "", "", &[]).matches(&stored));
    }

    #[test]
    fn test_name_takes_precedence_over_description() {
        let mut stored = resource("", "ftp://x/1", "", "annual report", &[]);
        stored.description = "figures".to_string();

        let mut template = resource("", "", "", "report", &[]);
        template.description = "nothing like it".to_string();
        assert!(template.matches(&stored));

        let mut by_description = resource("", "", "", "", &[]);
        by_description.description = "figure".to_string();
        assert!(by_description.matches(&stored));

        let by_name = resource("", "", "", "minutes", &[]);
        assert!(!by_name.matches(&stored));
    }

    #[test]
    fn test_description_ignored_when_name_is_set() {
        let mut stored = resource("", "ftp://x/1", "", "alpha", &[]);
        stored.description = "beta".to_string();

        let mut template = resource("", "", "", "zzz", &[]);
        template.description = "beta".to_string();
        assert!(!template.matches(&stored));
        assert!(!template.matches_update(&stored));
    }

    #[test]
    fn test_anonymized_keeps_empty_owner() {
        let named = resource("", "ftp://x/1", "alice", "", &[]);
        assert_eq!(named.anonymized().owner, ANONYMOUS_OWNER);
        let anonymous = resource("", "ftp://x/1", "", "", &[]);
        assert_eq!(anonymous.anonymized().owner, "");
    }
}
