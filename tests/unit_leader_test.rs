use chrono::Utc;
use k8s_openapi::api::coordination::v1::LeaseSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kubalert::core::leader::{Ownership, ownership};

fn lease_spec(holder: Option<&str>, renewed_secs_ago: i64, duration_secs: i32) -> LeaseSpec {
    LeaseSpec {
        holder_identity: holder.map(str::to_string),
        renew_time: Some(MicroTime(
            Utc::now() - chrono::Duration::seconds(renewed_secs_ago),
        )),
        lease_duration_seconds: Some(duration_secs),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_unheld_lease_is_acquirable() {
    let spec = LeaseSpec::default();
    assert_eq!(ownership(&spec, "me", Utc::now()), Ownership::Unheld);
}

#[tokio::test]
async fn test_own_lease_is_recognized() {
    let spec = lease_spec(Some("me"), 1, 15);
    assert!(matches!(
        ownership(&spec, "me", Utc::now()),
        Ownership::HeldBySelf { .. }
    ));
}

#[tokio::test]
async fn test_foreign_lease_reports_holder_and_expiry() {
    let spec = lease_spec(Some("other"), 1, 15);
    match ownership(&spec, "me", Utc::now()) {
        Ownership::HeldByOther { holder, expires_at } => {
            assert_eq!(holder, "other");
            assert!(expires_at > Utc::now());
        }
        other => panic!("unexpected ownership: {other:?}"),
    }
}

#[tokio::test]
async fn test_expired_foreign_lease_is_reported_expired() {
    // Renewed 60 seconds ago with a 15 second duration: long expired.
    let spec = lease_spec(Some("other"), 60, 15);
    match ownership(&spec, "me", Utc::now()) {
        Ownership::HeldByOther { expires_at, .. } => {
            assert!(expires_at < Utc::now());
        }
        other => panic!("unexpected ownership: {other:?}"),
    }
}
