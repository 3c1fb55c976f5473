use serde::Deserialize;

use mcpscout_utils::error::ConfigError;

use crate::PrimarySource;

#[derive(Deserialize)]
struct RawSource {
    #[serde(default)]
    name: Option<String>,
    id: String,
}

/// Parse the primary-source list given through the environment.
///
/// Two forms are accepted: a JSON array of `{"name", "id"}` objects, or a
/// comma-separated list of ids. Unnamed sources are called `Source_N`,
/// numbered from 1 in list order. Blank ids are dropped.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] when the value looks like JSON but
/// does not parse.
pub fn parse_primary_sources(raw: &str) -> Result<Vec<PrimarySource>, ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    let entries: Vec<(Option<String>, String)> = if raw.starts_with('[') {
        serde_json::from_str::<Vec<RawSource>>(raw)
            .map_err(|e| ConfigError::InvalidValue {
                key: "MCPSCOUT_PRIMARY_SOURCES".to_string(),
                value: format!("invalid JSON source list: {e}"),
            })?
            .into_iter()
            .map(|s| (s.name, s.id))
            .collect()
    } else {
        raw.split(',').map(|id| (None, id.to_string())).collect()
    };

    Ok(entries
        .into_iter()
        .map(|(name, id)| (name, id.trim().to_string()))
        .filter(|(_, id)| !id.is_empty())
        .enumerate()
        .map(|(index, (name, location))| PrimarySource {
            name: name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| format!("Source_{}", index + 1)),
            location,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comma_separated_ids_get_default_names() {
        let sources = parse_primary_sources("abc, def ,,ghi").unwrap();

        let names: Vec<_> = sources.iter().map(|s| s.name.as_str()).collect();
        let ids: Vec<_> = sources.iter().map(|s| s.location.as_str()).collect();
        assert_eq!(names, ["Source_1", "Source_2", "Source_3"]);
        assert_eq!(ids, ["abc", "def", "ghi"]);
    }

    #[test]
    fn test_json_list_keeps_names_and_order() {
        let sources = parse_primary_sources(
            r#"[{"name": "Team", "id": "cfg/team.json"}, {"id": "cfg/extra.json"}]"#,
        )
        .unwrap();

        assert_eq!(
            sources,
            vec![
                PrimarySource {
                    name: "Team".to_string(),
                    location: "cfg/team.json".to_string()
                },
                PrimarySource {
                    name: "Source_2".to_string(),
                    location: "cfg/extra.json".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        assert!(matches!(
            parse_primary_sources("[{\"id\": }]"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(parse_primary_sources("   ").unwrap().is_empty());
    }
}
