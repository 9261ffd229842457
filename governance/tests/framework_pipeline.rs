//! Integration tests for the resolve -> compile -> check pipeline
//!
//! Frameworks are served from an in-memory credential store as raw JSON, the
//! same shape a remote source would return.

use acdc_governance::patterns::{chain_integrity, jurisdiction_match, role_action_matrix};
use acdc_governance::{
    BundledCredentialStore, ConstraintChecker, ConstraintCompiler, ConstraintOrder,
    CredentialFetcher, EdgeOperator, FetchError, FrameworkResolver, GovernanceError,
    GovernanceFramework, ResolverConfig, RuleEnforcement,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

/// vLEI-style credential as a remote source would serve it
fn vlei_credential() -> Value {
    json!({
        "d": "EVleiFramework0001",
        "i": "EGleifSteward",
        "s": "GovernanceFramework",
        "a": {
            "name": "vLEI Ecosystem Governance",
            "version": "2.0.0",
            "rules": [
                { "name": "root-auth", "applies_to": "gleif_auth", "required_operator": "I2I" },
                {
                    "name": "qvi-issue",
                    "applies_to": "qvi_issue",
                    "required_operator": "DI2I",
                    "max_delegation_depth": 3,
                    "field_constraints": {
                        "jurisdiction": "$issuer.jurisdiction == $subject.country",
                        "role": "$subject.role in [\"OOR\", \"ECR\"]"
                    }
                },
                {
                    "name": "le-assign",
                    "applies_to": "le_assign",
                    "required_operator": "NI2I",
                    "field_constraints": { "note": "!= \"\"" },
                    "enforcement": "advisory"
                }
            ],
            "credential_matrix": [
                { "action": "issue", "role": "QVI", "required_operator": "DI2I" },
                { "action": "issue", "role": "LE", "required_operator": "ANY", "allowed": false }
            ],
            "authorities": { "GLEIF": ["EGleifSteward"] }
        },
        "e": {}
    })
}

/// Store fetcher that counts and delays fetches
struct SlowStore {
    store: BundledCredentialStore,
    fetches: AtomicUsize,
}

#[async_trait]
impl CredentialFetcher for SlowStore {
    async fn fetch(&self, said: &str) -> Result<Value, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.store.fetch(said).await
    }
}

/// Test resolving a raw credential and checking traversals against it
#[tokio::test]
async fn test_resolve_compile_check() {
    let store = BundledCredentialStore::new();
    let said = store.insert(vlei_credential()).await.unwrap();

    let resolver = FrameworkResolver::new(Arc::new(store));
    let framework = assert_ok!(resolver.resolve(&said).await);
    assert_eq!(framework.name(), "vLEI Ecosystem Governance");
    assert_eq!(framework.steward(), Some("EGleifSteward"));

    let compiler = ConstraintCompiler::new();
    let compiled = assert_ok!(compiler.compile(&framework));
    let checker = ConstraintChecker::new(compiled);

    // Edge checks
    assert!(checker.check_edge("gleif_auth", EdgeOperator::I2I).allowed);
    assert!(!checker.check_edge("gleif_auth", EdgeOperator::DI2I).allowed);
    assert!(checker.check_edge("le_assign", EdgeOperator::NI2I).allowed);
    assert!(!checker.check_edge("unknown", EdgeOperator::I2I).allowed);

    // Field checks
    let candidate = json!({
        "issuer": { "jurisdiction": "CH" },
        "subject": { "country": "CH", "role": "OOR" },
    });
    assert!(checker.check_field("jurisdiction", &candidate).allowed);
    assert!(checker.check_field("role", &candidate).allowed);

    let wrong_role = json!({ "subject": { "role": "Other" } });
    assert!(!checker.check_field("role", &wrong_role).allowed);

    // Advisory constraint allows with a note
    let advisory = checker.check_field("note", &json!({ "note": "" }));
    assert!(advisory.allowed);
    assert!(advisory.reason.unwrap().starts_with("advisory"));

    // Depth and matrix
    assert!(checker.check_delegation_depth("qvi_issue", 3).allowed);
    assert!(!checker.check_delegation_depth("qvi_issue", 4).allowed);
    assert!(checker.check_action("issue", "QVI", EdgeOperator::I2I).allowed);
    assert!(!checker.check_action("issue", "LE", EdgeOperator::I2I).allowed);
}

/// Test that a framework's own requirements always pass its checker
#[tokio::test]
async fn test_framework_satisfies_itself() {
    let store = BundledCredentialStore::new();
    let said = store.insert(vlei_credential()).await.unwrap();
    let resolver = FrameworkResolver::new(Arc::new(store));
    let framework = assert_ok!(resolver.resolve(&said).await);

    let checker = assert_ok!(ConstraintChecker::from_framework(&framework));
    for (label, requirement) in framework.edges() {
        let result = checker.check_edge(label, requirement.required_operator);
        assert!(result.allowed, "{} rejected its own requirement", label);

        for &weaker in EdgeOperator::all_descending() {
            if weaker.rank() < requirement.required_operator.rank() {
                assert!(!checker.check_edge(label, weaker).allowed);
            }
        }
    }
}

/// Test many concurrent pipelines on worker threads sharing one fetch and one
/// compilation
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_pipelines_share_work() {
    let store = BundledCredentialStore::new();
    let said = store.insert(vlei_credential()).await.unwrap();
    let fetcher = Arc::new(SlowStore {
        store,
        fetches: AtomicUsize::new(0),
    });
    let resolver = Arc::new(FrameworkResolver::new(fetcher.clone()));
    let compiler = Arc::new(ConstraintCompiler::new());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let resolver = Arc::clone(&resolver);
        let compiler = Arc::clone(&compiler);
        let said = said.clone();
        handles.push(tokio::spawn(async move {
            let framework = resolver.resolve(&said).await?;
            let checker = ConstraintChecker::new(compiler.compile(&framework)?);
            Ok::<_, GovernanceError>(checker.check_edge("qvi_issue", EdgeOperator::DI2I).allowed)
        }));
    }

    for handle in handles {
        assert!(assert_ok!(handle.await.unwrap()));
    }
    assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(compiler.cached_count(), 1);
}

/// Test that an unknown operator code fails resolution as malformed
#[tokio::test]
async fn test_unknown_operator_is_malformed() {
    let mut credential = vlei_credential();
    credential["a"]["rules"][0]["required_operator"] = json!("X2Y");

    let store = BundledCredentialStore::new();
    let said = store.insert(credential).await.unwrap();
    let resolver = FrameworkResolver::new(Arc::new(store));

    let err = assert_err!(resolver.resolve(&said).await);
    assert!(matches!(err, GovernanceError::MalformedFramework { .. }));
}

/// Test that a bad field expression fails compilation, not resolution
#[tokio::test]
async fn test_bad_expression_fails_compilation() {
    let mut credential = vlei_credential();
    credential["a"]["rules"][1]["field_constraints"]["jurisdiction"] = json!("$issuer.jurisdiction ~= 1");

    let store = BundledCredentialStore::new();
    let said = store.insert(credential).await.unwrap();
    let resolver = FrameworkResolver::new(Arc::new(store));

    let framework = assert_ok!(resolver.resolve(&said).await);
    let err = assert_err!(ConstraintCompiler::new().compile(&framework));
    assert!(matches!(err, GovernanceError::Compilation { .. }));
}

/// Test a framework built from patterns survives the credential round trip
#[tokio::test]
async fn test_pattern_framework_round_trip() {
    let framework = GovernanceFramework::builder("Regional QVI")
        .steward("ERegionalSteward")
        .rules(chain_integrity(
            &["root", "qvi", "le"],
            EdgeOperator::I2I,
            EdgeOperator::DI2I,
            EdgeOperator::NI2I,
        ))
        .rules(jurisdiction_match("qvi", "jurisdiction", "country", RuleEnforcement::Strict))
        .matrix_entries(role_action_matrix(
            &["QVI"],
            &["issue"],
            EdgeOperator::DI2I,
            &[],
            &[],
        ))
        .build()
        .unwrap();

    let store = BundledCredentialStore::new();
    store.insert_framework(&framework).await;

    let config = ResolverConfig::default().with_fetch_timeout(Duration::from_secs(1));
    let resolver = FrameworkResolver::with_config(Arc::new(store), config);
    let resolved = assert_ok!(resolver.resolve(framework.said()).await);
    assert_eq!(*resolved, framework);
}

/// Test the supersession chain through resolver and checker
#[tokio::test]
async fn test_superseded_framework_tightens_requirement() {
    let v1 = GovernanceFramework::builder("Evolving")
        .said("EEvolving1")
        .rules(chain_integrity(&["qvi"], EdgeOperator::NI2I, EdgeOperator::NI2I, EdgeOperator::NI2I))
        .build()
        .unwrap();
    let v2 = GovernanceFramework::builder("Evolving")
        .said("EEvolving2")
        .version("2.0.0")
        .supersedes("EEvolving1")
        .rules(chain_integrity(&["qvi"], EdgeOperator::DI2I, EdgeOperator::DI2I, EdgeOperator::DI2I))
        .build()
        .unwrap();

    let store = BundledCredentialStore::new();
    store.insert_framework(&v1).await;
    store.insert_framework(&v2).await;
    let resolver = FrameworkResolver::new(Arc::new(store));

    let chain = assert_ok!(resolver.resolve_chain("EEvolving2").await);
    assert_eq!(chain.saids(), vec!["EEvolving2", "EEvolving1"]);

    let old = assert_ok!(ConstraintChecker::from_framework(chain.root().unwrap()));
    let new = assert_ok!(ConstraintChecker::from_framework(chain.active().unwrap()));
    assert!(old.check_edge("qvi", EdgeOperator::NI2I).allowed);
    assert!(!new.check_edge("qvi", EdgeOperator::NI2I).allowed);

    let active = assert_ok!(resolver.resolve_active("EEvolving1").await);
    assert_eq!(active.version(), "2.0.0");
}
