use crate::error::MappingError;

/// Native key of the hierarchy root.
pub const ROOT_KEY: &str = "_";

///
/// ParsedKey
///
/// Hierarchical DN string decomposed into the flat native key used by both
/// backends. `inum=X,ou=people,o=org` becomes `people_X`; the organization
/// base itself becomes the root key `_`.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParsedKey {
    dn: String,
    key: String,
    /// Attribute of the leftmost RDN, e.g. `inum`.
    attribute_name: String,
}

impl ParsedKey {
    /// Parse a DN into its native key.
    pub fn from_dn(dn: &str) -> Result<Self, MappingError> {
        let dn = dn.trim();
        if dn.is_empty() {
            return Err(MappingError::MissingBaseKey);
        }

        let mut rdns = Vec::new();
        for part in dn.split(',') {
            let part = part.trim();
            let (attr, value) = part.split_once('=').ok_or_else(|| {
                MappingError::MalformedKey {
                    key: dn.to_string(),
                    reason: format!("component '{part}' has no '='"),
                }
            })?;
            let (attr, value) = (attr.trim(), value.trim());
            if attr.is_empty() || value.is_empty() {
                return Err(MappingError::MalformedKey {
                    key: dn.to_string(),
                    reason: format!("component '{part}' has an empty side"),
                });
            }
            rdns.push((attr, value));
        }

        // the organization base contributes nothing to the key
        let segments: Vec<&(&str, &str)> = rdns
            .iter()
            .filter(|(attr, _)| !attr.eq_ignore_ascii_case("o"))
            .collect();

        let key = if segments.is_empty() {
            ROOT_KEY.to_string()
        } else {
            segments
                .iter()
                .rev()
                .map(|(_, value)| sanitize(value))
                .collect::<Vec<_>>()
                .join("_")
        };

        let attribute_name = rdns
            .first()
            .map(|(attr, _)| (*attr).to_string())
            .unwrap_or_default();

        Ok(Self {
            dn: dn.to_string(),
            key,
            attribute_name,
        })
    }

    #[must_use]
    pub fn dn(&self) -> &str {
        &self.dn
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn attribute_name(&self) -> &str {
        &self.attribute_name
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.key == ROOT_KEY
    }

    /// Key prefix that covers the whole subtree under this key.
    #[must_use]
    pub fn subtree_prefix(&self) -> String {
        if self.is_root() {
            String::new()
        } else {
            format!("{}_", self.key)
        }
    }
}

/// Native keys allow word characters and dashes only.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_dn_flattens_outermost_first() {
        let parsed = ParsedKey::from_dn("inum=x123,ou=people,o=org").unwrap();
        assert_eq!(parsed.key(), "people_x123");
        assert_eq!(parsed.attribute_name(), "inum");
        assert!(!parsed.is_root());
    }

    #[test]
    fn organization_base_is_root() {
        let parsed = ParsedKey::from_dn("o=org").unwrap();
        assert_eq!(parsed.key(), ROOT_KEY);
        assert!(parsed.is_root());
        assert_eq!(parsed.subtree_prefix(), "");
    }

    #[test]
    fn container_dn_keys_on_container() {
        let parsed = ParsedKey::from_dn("ou=people,o=org").unwrap();
        assert_eq!(parsed.key(), "people");
        assert_eq!(parsed.subtree_prefix(), "people_");
    }

    #[test]
    fn special_characters_are_sanitized() {
        let parsed = ParsedKey::from_dn("inum=a@b!c,ou=clients,o=org").unwrap();
        assert_eq!(parsed.key(), "clients_a_b_c");
    }

    #[test]
    fn rejects_malformed_dn() {
        assert!(matches!(
            ParsedKey::from_dn(""),
            Err(MappingError::MissingBaseKey)
        ));
        assert!(matches!(
            ParsedKey::from_dn("inum,o=org"),
            Err(MappingError::MalformedKey { .. })
        ));
        assert!(matches!(
            ParsedKey::from_dn("inum=,o=org"),
            Err(MappingError::MalformedKey { .. })
        ));
    }
}
