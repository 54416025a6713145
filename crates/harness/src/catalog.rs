//! Built-in suites and suite selection

use std::collections::BTreeSet;

use tracing::debug;

use crate::config::SuiteSelection;
use crate::error::{HarnessError, HarnessResult};
use crate::spec::SuiteFile;

const BUILTIN: [(&str, &str); 3] = [
    ("location.yaml", include_str!("../suites/location.yaml")),
    ("agency.yaml", include_str!("../suites/agency.yaml")),
    ("regions.yaml", include_str!("../suites/regions.yaml")),
];

/// Suites compiled into the harness
pub fn builtin_suites() -> HarnessResult<Vec<SuiteFile>> {
    BUILTIN
        .iter()
        .map(|(file, yaml)| {
            SuiteFile::from_yaml(yaml).map_err(|e| HarnessError::suite(*file, e.to_string()))
        })
        .collect()
}

/// Load, filter and validate the suites a run should execute
///
/// Name filters keep whole suites. Tag filters keep a suite when the suite
/// carries the tag, and otherwise only its endpoints that do.
pub fn load_suites(selection: &SuiteSelection) -> HarnessResult<Vec<SuiteFile>> {
    let mut suites = Vec::new();
    if selection.builtin {
        suites.extend(builtin_suites()?);
    }
    if let Some(dir) = &selection.dir {
        if !dir.is_dir() {
            return Err(HarnessError::Config(format!(
                "suite directory not found: {}",
                dir.display()
            )));
        }
        suites.extend(SuiteFile::load_all(dir)?);
    }

    if !selection.names.is_empty() {
        for name in &selection.names {
            if !suites.iter().any(|s| &s.name == name) {
                return Err(HarnessError::Config(format!("unknown suite '{}'", name)));
            }
        }
        suites.retain(|s| selection.names.contains(&s.name));
    }

    if !selection.tags.is_empty() {
        let tagged = |tags: &[String]| tags.iter().any(|t| selection.tags.contains(t));
        suites = suites
            .into_iter()
            .filter_map(|mut suite| {
                if !tagged(&suite.tags) {
                    suite.endpoints.retain(|e| tagged(&e.tags));
                }
                (!suite.endpoints.is_empty()).then_some(suite)
            })
            .collect();
    }

    validate_all(&suites)?;
    debug!(
        "Selected {} suite(s) with {} endpoint(s)",
        suites.len(),
        suites.iter().map(|s| s.endpoints.len()).sum::<usize>()
    );
    Ok(suites)
}

/// Validate each suite, and check suite and endpoint names are unique
/// across all of them
pub fn validate_all(suites: &[SuiteFile]) -> HarnessResult<()> {
    let mut suite_names = BTreeSet::new();
    let mut endpoint_names = BTreeSet::new();
    for suite in suites {
        if !suite_names.insert(suite.name.as_str()) {
            return Err(HarnessError::suite(&suite.name, "suite name used twice"));
        }
        suite.validate()?;
        for endpoint in &suite.endpoints {
            if !endpoint_names.insert(endpoint.name.as_str()) {
                return Err(HarnessError::suite(
                    &suite.name,
                    format!("endpoint '{}' is also declared by another suite", endpoint.name),
                ));
            }
        }
    }
    Ok(())
}

/// Find an endpoint by name
pub fn find_endpoint<'a>(
    suites: &'a [SuiteFile],
    name: &str,
) -> Option<(&'a SuiteFile, &'a crate::spec::EndpointSpec)> {
    suites.iter().find_map(|suite| {
        suite
            .endpoints
            .iter()
            .find(|e| e.name == name)
            .map(|e| (suite, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{ParameterMatrix, Variant};
    use chrono::Utc;

    fn builtin_only() -> SuiteSelection {
        SuiteSelection::default()
    }

    #[test]
    fn test_builtin_suites_validate() {
        let suites = load_suites(&builtin_only()).unwrap();
        let names: Vec<_> = suites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["location", "agency", "regions"]);
    }

    #[test]
    fn test_builtin_case_ids_unique() {
        let suites = load_suites(&builtin_only()).unwrap();
        let anchor = Utc::now();
        let mut ids = BTreeSet::new();
        for suite in &suites {
            for endpoint in &suite.endpoints {
                for case in ParameterMatrix::for_endpoint(endpoint, anchor).cases() {
                    assert!(ids.insert(case.id.clone()), "duplicate case id {}", case.id);
                }
            }
        }
        assert!(ids.len() > 100);
    }

    #[test]
    fn test_price_conflict_tolerates_both() {
        let suites = load_suites(&builtin_only()).unwrap();
        let (_, listing) = find_endpoint(&suites, "location-list").unwrap();
        let conflict = ParameterMatrix::for_endpoint(listing, Utc::now())
            .cases()
            .find(|c| c.id == "location-list/conflict/price_min>price_max")
            .unwrap();
        assert_eq!(conflict.variant, Variant::Conflict);
        assert!(conflict.expect.allowed.contains(&200));
        assert!(conflict.expect.allowed.contains(&400));
    }

    #[test]
    fn test_region_sweeps_are_optional() {
        let suites = load_suites(&builtin_only()).unwrap();
        let (suite, endpoint) = find_endpoint(&suites, "region-student-count").unwrap();
        assert_eq!(suite.auth, "agency");
        let sweeps: Vec<_> = ParameterMatrix::for_endpoint(endpoint, Utc::now())
            .cases()
            .filter(|c| c.variant == Variant::Sweep)
            .collect();
        assert_eq!(sweeps.len(), 14);
        assert!(sweeps.iter().all(|c| !c.mandatory && c.label.is_some()));
    }

    #[test]
    fn test_name_filter() {
        let selection = SuiteSelection {
            names: vec!["location".to_string()],
            ..builtin_only()
        };
        let suites = load_suites(&selection).unwrap();
        assert_eq!(suites.len(), 1);

        let selection = SuiteSelection {
            names: vec!["nope".to_string()],
            ..builtin_only()
        };
        assert!(load_suites(&selection).is_err());
    }

    #[test]
    fn test_tag_filter_keeps_tagged_endpoints() {
        let selection = SuiteSelection {
            tags: vec!["perf".to_string()],
            ..builtin_only()
        };
        let suites = load_suites(&selection).unwrap();
        assert_eq!(suites.len(), 1);
        let names: Vec<_> = suites[0].endpoints.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["location-latency", "location-latency-filtered"]);
    }

    #[test]
    fn test_suite_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("extra.yaml"),
            "name: extra\nauth: none\nendpoints:\n  - name: health\n    path: health/\n    protected: false\n",
        )
        .unwrap();
        let selection = SuiteSelection {
            builtin: false,
            dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let suites = load_suites(&selection).unwrap();
        assert_eq!(suites[0].name, "extra");

        let selection = SuiteSelection {
            dir: Some(dir.path().join("missing")),
            ..Default::default()
        };
        assert!(load_suites(&selection).is_err());
    }

    #[test]
    fn test_duplicate_endpoint_across_suites() {
        let mut suites = builtin_suites().unwrap();
        let mut copy = suites[0].clone();
        copy.name = "copy".to_string();
        suites.push(copy);
        let err = validate_all(&suites).unwrap_err().to_string();
        assert!(err.contains("also declared"), "{}", err);
    }
}
