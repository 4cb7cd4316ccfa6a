//! Static registry of the retail stores that can be watched.

use crate::error::Error;

/// One watchable store: short code, human name and the query parameters
/// identifying it to the pickup endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreTarget {
    pub code: String,
    pub display_name: String,
    pub query_params: Vec<(String, String)>,
}

/// (code, display name, retail store id), in check order.
const REGISTRY: &[(&str, &str, &str)] = &[
    ("WACR", "Walnut Creek", "R014"),
    ("SFUS", "San Francisco Union Square", "R075"),
    ("SACR", "Sacramento Arden Fair", "R070"),
    ("ROSE", "Roseville", "R298"),
    ("4THS", "4th Street (Berkeley)", "R414"),
    ("BAYS", "Bay Street (Emeryville)", "R057"),
    ("STPL", "Stoneridge Mall (Pleasanton)", "R101"),
    ("CHEST", "Chestnut Street (SF)", "R217"),
    ("STSF", "Stonestown (SF)", "R033"),
    ("COMA", "Corte Madera", "R071"),
];

/// Builds every registered store for the given product code, in registry order.
pub fn registry(product_code: &str) -> Vec<StoreTarget> {
    REGISTRY
        .iter()
        .map(|(code, name, store_id)| StoreTarget {
            code: (*code).to_string(),
            display_name: (*name).to_string(),
            query_params: vec![
                ("parts.0".to_string(), product_code.to_string()),
                ("store".to_string(), (*store_id).to_string()),
            ],
        })
        .collect()
}

/// Resolves the stores to check. `None` selects the whole registry.
///
/// # Errors
///
/// Returns [`Error::UnknownStore`] if `location` is not a registered code.
pub fn select(product_code: &str, location: Option<&str>) -> Result<Vec<StoreTarget>, Error> {
    let all = registry(product_code);
    let Some(code) = location else {
        return Ok(all);
    };

    let known = all
        .iter()
        .map(|store| store.code.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    all.iter()
        .find(|store| store.code.eq_ignore_ascii_case(code))
        .cloned()
        .map(|store| vec![store])
        .ok_or_else(|| Error::UnknownStore {
            code: code.to_string(),
            known,
        })
}
