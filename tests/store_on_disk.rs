//! The initialization flag and accounts survive a reopen of the database file.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use efika_site::access::Role;
use efika_site::auth::{
    IdentityProvider, LocalIdentityProvider, SignUpMetadata, is_system_initialized,
};
use efika_site::error::AuthError;
use efika_site::store::{Database, LibSqlBackend};

async fn provider_at(path: &std::path::Path) -> LocalIdentityProvider {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(path).await.unwrap());
    LocalIdentityProvider::new(db, Duration::from_secs(3600), SecretString::from("k"))
        .with_bcrypt_cost(4)
}

#[tokio::test]
async fn initialization_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("efika.db");

    {
        let provider = provider_at(&path).await;
        assert!(!is_system_initialized(&provider).await.unwrap());
        provider
            .create_initial_admin(
                "root@efika.com.br",
                "Senha123",
                SignUpMetadata {
                    full_name: "Root".into(),
                    role: Role::SuperAdmin,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    let reopened = provider_at(&path).await;
    assert!(is_system_initialized(&reopened).await.unwrap());
    reopened
        .sign_in_with_password("root@efika.com.br", "Senha123")
        .await
        .unwrap();

    let again = reopened
        .create_initial_admin(
            "other@efika.com.br",
            "Senha123",
            SignUpMetadata {
                full_name: "Other".into(),
                role: Role::SuperAdmin,
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(again, Err(AuthError::AlreadyInitialized)));
    assert_eq!(reopened.list_profiles().await.unwrap().len(), 1);
}
