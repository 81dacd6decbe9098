//! Resolver - operation id -> dispatch target
//!
//! Matching on operation ids and subsystem names is case-insensitive.
//! Global resolution only sees dispatchable service keys (see
//! [`DispatchTable::build`]); scoped resolution sees every key of the
//! subsystem and prefers its active version.

use crate::cache::{CacheSnapshot, DispatchTable, SpecCache};
use crate::error::{Error, Result};
use crate::model::{ApiOperationSpec, Service, make_service_key};
use std::sync::Arc;
use tracing::debug;

/// A resolved dispatch target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Service key the operation was found under
    pub service_key: String,
    /// Base URL and auth of the target service
    pub service: Service,
    /// Operation id as written in the operation table
    pub operation_id: String,
    /// Method and path template
    pub spec: ApiOperationSpec,
}

/// Resolves operation ids against the current cache generation
#[derive(Clone)]
pub struct Resolver {
    cache: Arc<SpecCache>,
}

impl Resolver {
    /// Resolver reading from `cache`
    pub fn new(cache: Arc<SpecCache>) -> Self {
        Self { cache }
    }

    /// Resolve `operation_id` across every dispatchable service
    pub fn resolve_global(&self, operation_id: &str) -> Result<Resolution> {
        resolve_global(&self.cache.snapshot(), operation_id)
    }

    /// Resolve `operation_id` within one subsystem
    pub fn resolve_scoped(&self, subsystem: &str, operation_id: &str) -> Result<Resolution> {
        resolve_scoped(&self.cache.snapshot(), subsystem, operation_id)
    }
}

/// Global resolution over a snapshot.
///
/// Fails with `AmbiguousOperation` when several dispatchable services define
/// the id, and with `NotFound` when none does.
pub fn resolve_global(snapshot: &CacheSnapshot, operation_id: &str) -> Result<Resolution> {
    let table = &snapshot.table;
    match table.global_candidates(operation_id) {
        [] => Err(Error::not_found(format!(
            "operation '{operation_id}' not found; available services: [{}]",
            available_services(table)
        ))),
        [service_key] => build_resolution(table, service_key, operation_id),
        keys => Err(Error::AmbiguousOperation {
            operation_id: operation_id.to_string(),
            service_keys: keys.to_vec(),
        }),
    }
}

/// Scoped resolution over a snapshot.
///
/// Candidate keys are `subsystem` itself and every `subsystem_<version>`
/// key. Among candidates defining the operation the framework's active
/// version wins, otherwise the lexicographically first key.
pub fn resolve_scoped(
    snapshot: &CacheSnapshot,
    subsystem: &str,
    operation_id: &str,
) -> Result<Resolution> {
    let table = &snapshot.table;
    let subsystem_lower = subsystem.to_lowercase();
    let prefix = format!("{subsystem_lower}_");
    let candidates: Vec<&String> = table
        .operations
        .keys()
        .filter(|key| {
            let key = key.to_lowercase();
            key == subsystem_lower || key.starts_with(&prefix)
        })
        .collect();

    if candidates.is_empty() {
        return Err(Error::not_found(format!(
            "subsystem '{subsystem}' not found; available services: [{}]",
            available_services(table)
        )));
    }

    let matching: Vec<&String> = candidates
        .iter()
        .copied()
        .filter(|key| find_operation(table, key, operation_id).is_some())
        .collect();

    let active_key = snapshot
        .active_versions
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(subsystem))
        .map(|(name, version)| make_service_key(name, version));
    let chosen = matching
        .iter()
        .find(|key| Some(key.as_str()) == active_key.as_deref())
        .or_else(|| matching.first());

    match chosen {
        Some(service_key) => {
            debug!(
                "Resolved {}/{} to {} ({} candidates)",
                subsystem,
                operation_id,
                service_key,
                matching.len()
            );
            build_resolution(table, service_key, operation_id)
        }
        None => {
            let available: Vec<&str> = candidates
                .iter()
                .flat_map(|key| table.operations[key.as_str()].keys())
                .map(String::as_str)
                .collect();
            Err(Error::not_found(format!(
                "operation '{operation_id}' not found in subsystem '{subsystem}'; available operations: [{}]",
                available.join(", ")
            )))
        }
    }
}

fn find_operation<'a>(
    table: &'a DispatchTable,
    service_key: &str,
    operation_id: &str,
) -> Option<(&'a String, &'a ApiOperationSpec)> {
    table
        .operations
        .get(service_key)?
        .iter()
        .find(|(id, _)| id.eq_ignore_ascii_case(operation_id))
}

fn build_resolution(
    table: &DispatchTable,
    service_key: &str,
    operation_id: &str,
) -> Result<Resolution> {
    let (found_id, spec) = find_operation(table, service_key, operation_id).ok_or_else(|| {
        Error::not_found(format!("operation '{operation_id}' not found in {service_key}"))
    })?;
    let service = table.services.get(service_key).ok_or_else(|| {
        Error::not_found(format!("no server info for service '{service_key}'"))
    })?;
    Ok(Resolution {
        service_key: service_key.to_string(),
        service: service.clone(),
        operation_id: found_id.clone(),
        spec: spec.clone(),
    })
}

fn available_services(table: &DispatchTable) -> String {
    table
        .operations
        .keys()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AuthType;
    use crate::testing::{TestContext, operation, seed_store};

    fn resolver(ctx: &TestContext) -> Resolver {
        let cache = SpecCache::new(Arc::new(seed_store(ctx, "http://tb:1323/tumblebug")));
        cache.init().unwrap();
        Resolver::new(Arc::new(cache))
    }

    #[test]
    fn test_resolve_global_case_insensitive() {
        let ctx = TestContext::new();
        let resolver = resolver(&ctx);

        let a = resolver.resolve_global("GetMcis").unwrap();
        let b = resolver.resolve_global("getmcis").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.service_key, "cb-tumblebug_0.11.13");
        assert_eq!(a.operation_id, "GetMcis");
        assert_eq!(a.spec.resource_path, "/ns/{nsId}/mcis/{mcisId}");
        assert_eq!(a.service.base_url, "http://tb:1323/tumblebug");
        assert_eq!(a.service.auth_type(), AuthType::Basic);
    }

    #[test]
    fn test_resolve_global_not_found_lists_services() {
        let ctx = TestContext::new();
        let resolver = resolver(&ctx);
        let err = resolver.resolve_global("nope").unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("cb-tumblebug_0.11.13"));
    }

    #[test]
    fn test_resolve_global_skips_inactive_versions() {
        let ctx = TestContext::new();
        let resolver = resolver(&ctx);
        // listUsers exists in 0.1.0 (active) and 0.2.0: no ambiguity
        let res = resolver.resolve_global("listUsers").unwrap();
        assert_eq!(res.service_key, "mc-iam-manager_0.1.0");
    }

    #[test]
    fn test_resolve_global_ambiguous() {
        let ctx = TestContext::new();
        let store = seed_store(&ctx, "http://127.0.0.1:9");
        store
            .replace_operations(
                "cb-spider",
                "0.11.13",
                [("GETNS".to_string(), operation("get", "/ns"))].into(),
            )
            .unwrap();
        let cache = SpecCache::new(Arc::new(store));
        cache.init().unwrap();
        let resolver = Resolver::new(Arc::new(cache));

        match resolver.resolve_global("GetNs").unwrap_err() {
            Error::AmbiguousOperation { service_keys, .. } => {
                assert_eq!(
                    service_keys,
                    vec!["cb-spider_0.11.13".to_string(), "cb-tumblebug_0.11.13".to_string()]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_scoped_prefers_active_version() {
        let ctx = TestContext::new();
        let resolver = resolver(&ctx);

        for _ in 0..5 {
            let res = resolver.resolve_scoped("mc-iam-manager", "LISTUSERS").unwrap();
            assert_eq!(res.service_key, "mc-iam-manager_0.1.0");
            assert_eq!(res.spec.resource_path, "/0.1.0/users");
        }
    }

    #[test]
    fn test_resolve_scoped_follows_active_version_change() {
        let ctx = TestContext::new();
        let cache = SpecCache::new(Arc::new(seed_store(&ctx, "http://127.0.0.1:9")));
        cache.init().unwrap();
        let cache = Arc::new(cache);
        let resolver = Resolver::new(cache.clone());

        cache.update_active_version("mc-iam-manager", "0.2.0").unwrap();
        let res = resolver.resolve_scoped("mc-iam-manager", "listUsers").unwrap();
        assert_eq!(res.service_key, "mc-iam-manager_0.2.0");
    }

    #[test]
    fn test_resolve_scoped_exact_key() {
        let ctx = TestContext::new();
        let resolver = resolver(&ctx);
        let res = resolver
            .resolve_scoped("mc-iam-manager_0.2.0", "listUsers")
            .unwrap();
        assert_eq!(res.service_key, "mc-iam-manager_0.2.0");
    }

    #[test]
    fn test_resolve_scoped_subsystem_case_insensitive() {
        let ctx = TestContext::new();
        let resolver = resolver(&ctx);
        let res = resolver.resolve_scoped("MC-IAM-Manager", "listUsers").unwrap();
        assert_eq!(res.service_key, "mc-iam-manager_0.1.0");
    }

    #[test]
    fn test_resolve_scoped_prefix_is_not_substring() {
        let ctx = TestContext::new();
        let resolver = resolver(&ctx);
        assert!(resolver.resolve_scoped("mc-iam", "listUsers").unwrap_err().is_not_found());
    }

    #[test]
    fn test_resolve_scoped_missing_operation() {
        let ctx = TestContext::new();
        let resolver = resolver(&ctx);
        let err = resolver.resolve_scoped("cb-spider", "GetNs").unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("ListCloudOS"));
    }

    #[test]
    fn test_uninitialized_cache_resolves_nothing() {
        let ctx = TestContext::new();
        let cache = SpecCache::new(Arc::new(crate::SpecStore::new(ctx.path())));
        let resolver = Resolver::new(Arc::new(cache));
        assert!(resolver.resolve_global("GetNs").unwrap_err().is_not_found());
        assert!(resolver.resolve_scoped("cb-tumblebug", "GetNs").unwrap_err().is_not_found());
    }
}
