mod common;

use common::{FakeAzure, GRANT_ID, MG_ID, TempDirGuard};
use onboard_preflight::cli::commands::revoke::revoke;
use onboard_preflight::state::{FileGrantStore, GrantStore, MemoryGrantStore};

#[test]
fn revoke_consumes_persisted_record() -> anyhow::Result<()> {
    let dir = TempDirGuard::new("revoke");
    let store = FileGrantStore::new(dir.path().join("grant"));
    store.write(GRANT_ID)?;
    let azure = FakeAzure::sufficient();

    let outcome = revoke(&azure, &store, None, Some(MG_ID))?;

    assert_eq!(outcome.assignment_id, GRANT_ID);
    assert!(outcome.record_cleared);
    assert_eq!(azure.count("delete_role_assignment"), 1);
    assert_eq!(store.read()?, None);

    // A second revoke has nothing to act on
    assert!(revoke(&azure, &store, None, Some(MG_ID)).is_err());
    assert_eq!(azure.count("delete_role_assignment"), 1);
    Ok(())
}

#[test]
fn revoke_refuses_malformed_record() {
    let store = MemoryGrantStore::with_record("not-a-role-assignment");
    let azure = FakeAzure::sufficient();

    let err = revoke(&azure, &store, None, None).unwrap_err();

    assert!(err.to_string().contains("malformed"));
    assert!(!azure.called("delete_role_assignment"));
}

#[test]
fn explicit_id_leaves_unrelated_record() -> anyhow::Result<()> {
    let store = MemoryGrantStore::with_record(GRANT_ID);
    let azure = FakeAzure::sufficient();
    let other = "/subscriptions/s/providers/Microsoft.Authorization/roleAssignments/abc-123";

    let outcome = revoke(&azure, &store, Some(other), None)?;

    assert!(!outcome.record_cleared);
    assert_eq!(store.read()?.as_deref(), Some(GRANT_ID));
    Ok(())
}
