//! Registry fixtures

use super::TestContext;
use crate::model::{
    ApiOperationSpec, AuthType, Framework, FrameworkVersion, FrameworksConfig,
    OperationInfoDocument, OperationTable, make_service_key,
};
use crate::store::SpecStore;

/// Enabled version without auth pointing at `http://localhost:1024`
pub fn sample_version(version: &str) -> FrameworkVersion {
    FrameworkVersion {
        version: version.to_string(),
        swagger_url: "http://localhost:1024/swagger.yaml".to_string(),
        base_url: "http://localhost:1024".to_string(),
        auth_type: AuthType::None,
        username: String::new(),
        password: String::new(),
        enabled: true,
    }
}

/// Framework declaring `versions`, the first one active
pub fn sample_framework(name: &str, versions: &[&str]) -> Framework {
    Framework {
        name: name.to_string(),
        display_name: name.to_uppercase(),
        active_version: versions.first().map(|v| v.to_string()).unwrap_or_default(),
        versions: versions.iter().map(|v| sample_version(v)).collect(),
    }
}

/// Single-entry operation table entry
pub fn operation(method: &str, resource_path: &str) -> ApiOperationSpec {
    ApiOperationSpec {
        method: method.to_string(),
        resource_path: resource_path.to_string(),
        description: String::new(),
    }
}

/// Write a small, consistent registry into the context directory.
///
/// - `cb-tumblebug` 0.11.13 (active, basic auth default/default): `GetNs`,
///   `GetMcis`, `PostFile`
/// - `mc-iam-manager` 0.1.0 (active, bearer) and 0.2.0: `listUsers`
/// - `cb-spider` 0.11.13 (no auth): `ListCloudOS`
///
/// Every version dispatches to `base_url`.
pub fn seed_store(ctx: &TestContext, base_url: &str) -> SpecStore {
    let store = SpecStore::new(ctx.path());

    let mut tumblebug = sample_framework("cb-tumblebug", &["0.11.13"]);
    tumblebug.versions[0].auth_type = AuthType::Basic;
    tumblebug.versions[0].username = "default".into();
    tumblebug.versions[0].password = "default".into();

    let mut iam = sample_framework("mc-iam-manager", &["0.1.0", "0.2.0"]);
    for version in &mut iam.versions {
        version.auth_type = AuthType::Bearer;
    }

    let spider = sample_framework("cb-spider", &["0.11.13"]);

    let mut config = FrameworksConfig {
        frameworks: vec![spider, tumblebug, iam],
    };
    for framework in &mut config.frameworks {
        for version in &mut framework.versions {
            version.base_url = base_url.to_string();
        }
    }
    store.save_frameworks(&config).expect("seed frameworks");
    store.generate_server_info(&config).expect("seed server info");

    let mut doc = OperationInfoDocument::default();
    let mut tumblebug_ops = OperationTable::new();
    tumblebug_ops.insert("GetNs".into(), operation("get", "/ns/{nsId}"));
    tumblebug_ops.insert("GetMcis".into(), operation("get", "/ns/{nsId}/mcis/{mcisId}"));
    tumblebug_ops.insert("PostFile".into(), operation("post", "/file"));
    doc.service_actions
        .insert(make_service_key("cb-tumblebug", "0.11.13"), tumblebug_ops);

    for version in ["0.1.0", "0.2.0"] {
        let mut iam_ops = OperationTable::new();
        iam_ops.insert("listUsers".into(), operation("get", &format!("/{version}/users")));
        doc.service_actions
            .insert(make_service_key("mc-iam-manager", version), iam_ops);
    }

    let mut spider_ops = OperationTable::new();
    spider_ops.insert("ListCloudOS".into(), operation("get", "/cloudos"));
    doc.service_actions
        .insert(make_service_key("cb-spider", "0.11.13"), spider_ops);

    store.save_operation_info(&doc).expect("seed operation info");
    store
}
