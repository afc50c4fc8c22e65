mod common;

use authkeep::auth::{AuthError, SessionSettings};
use authkeep::store::{Rotation, SessionStore, StoreError};
use common::{register, test_app, test_app_with};

async fn stored_token_id(app: &common::TestApp, client_id: &str) -> Option<String> {
    let row: Option<(String,)> = sqlx::query_as("SELECT token_id FROM sessions WHERE client_id = ?")
        .bind(client_id)
        .fetch_optional(app.ctx.db.pool())
        .await
        .unwrap();
    row.map(|r| r.0)
}

#[tokio::test]
async fn test_rotate_with_wrong_token_id_never_mutates() {
    let app = test_app().await;
    let tokens = register(&app, "alice", "a@x.com", "pw1").await;
    let sessions = app.ctx.db.sessions();
    let stored = stored_token_id(&app, &tokens.client_id).await.unwrap();

    let mut candidates = vec![
        String::new(),
        " ".to_string(),
        stored.to_uppercase(),
        format!("{stored} "),
        stored[..stored.len() - 1].to_string(),
        format!("{stored}x"),
    ];
    candidates.extend((0..32).map(|_| uuid::Uuid::new_v4().to_string()));

    for old in candidates {
        if old == stored {
            continue;
        }
        let result = sessions
            .rotate(&Rotation {
                client_id: tokens.client_id.clone(),
                old_token_id: old.clone(),
                new_token_id: "attacker".to_string(),
                new_expires_at: u64::MAX / 2,
            })
            .await;
        assert!(
            matches!(result, Err(StoreError::SessionInvalid)),
            "rotation with {old:?} should fail"
        );
        assert_eq!(
            stored_token_id(&app, &tokens.client_id).await.as_deref(),
            Some(stored.as_str())
        );
    }

    // The legitimate holder is unaffected
    app.ctx.auth.refresh(&tokens.refresh_token).await.unwrap();
}

#[tokio::test]
async fn test_rotation_is_scoped_to_client() {
    let app = test_app().await;
    let first = register(&app, "alice", "a@x.com", "pw1").await;
    let second = register(&app, "bob", "b@x.com", "pw2").await;
    let sessions = app.ctx.db.sessions();

    // Correct token id, wrong client
    let alice_token = stored_token_id(&app, &first.client_id).await.unwrap();
    let result = sessions
        .rotate(&Rotation {
            client_id: second.client_id.clone(),
            old_token_id: alice_token.clone(),
            new_token_id: "stolen".to_string(),
            new_expires_at: u64::MAX / 2,
        })
        .await;
    assert!(matches!(result, Err(StoreError::SessionInvalid)));
    assert_eq!(
        stored_token_id(&app, &first.client_id).await,
        Some(alice_token)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_refresh_has_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rotation.db");
    let app = test_app_with(path.to_str().unwrap(), SessionSettings::default()).await;
    let tokens = register(&app, "alice", "a@x.com", "pw1").await;

    let auth = app.ctx.auth.clone();
    let results = join_both(
        {
            let auth = auth.clone();
            let token = tokens.refresh_token.clone();
            tokio::spawn(async move { auth.refresh(&token).await })
        },
        {
            let auth = auth.clone();
            let token = tokens.refresh_token.clone();
            tokio::spawn(async move { auth.refresh(&token).await })
        },
    )
    .await;

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let losers = results
        .iter()
        .filter(|r| matches!(r, Err(AuthError::SessionInvalid)))
        .count();
    assert_eq!((winners, losers), (1, 1));
}

async fn join_both<T>(
    a: tokio::task::JoinHandle<T>,
    b: tokio::task::JoinHandle<T>,
) -> Vec<T> {
    let (a, b) = tokio::join!(a, b);
    vec![a.unwrap(), b.unwrap()]
}
