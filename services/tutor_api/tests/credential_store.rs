use chain_tutor_core::ports::CredentialStore;
use tutor_lib::adapters::FileCredentialStore;

#[tokio::test]
async fn missing_file_loads_as_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCredentialStore::new(dir.path().join("user_api_key"));
    assert_eq!(store.load().await.unwrap(), None);
    // Clearing an absent entry is not an error.
    store.clear().await.unwrap();
}

#[tokio::test]
async fn saved_credential_survives_a_new_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("user_api_key");

    FileCredentialStore::new(&path).save("AIzaUserKey").await.unwrap();

    let reopened = FileCredentialStore::new(&path);
    assert_eq!(reopened.load().await.unwrap().as_deref(), Some("AIzaUserKey"));

    reopened.clear().await.unwrap();
    assert!(!path.exists());
    assert_eq!(reopened.load().await.unwrap(), None);
}

#[tokio::test]
async fn blank_file_counts_as_no_credential() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("user_api_key");
    std::fs::write(&path, "  \n").unwrap();
    assert_eq!(FileCredentialStore::new(&path).load().await.unwrap(), None);
}
