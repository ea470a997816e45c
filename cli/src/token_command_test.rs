use std::cell::Cell;
use std::rc::Rc;

use super::*;

#[tokio::test]
async fn token_is_trimmed_stdout() {
    let source = CommandTokenSource::new("printf '  tok-1\\n'");
    assert_eq!(source.get_token(false).await, Ok("tok-1".to_owned()));
}

#[tokio::test]
async fn cached_token_is_reused_until_forced() {
    let dir = std::env::temp_dir().join(format!("gatekeep-token-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let counter = dir.join("count");
    let _ = std::fs::remove_file(&counter);

    // Each run appends a line and prints the line count.
    let command = format!("echo x >> '{0}'; wc -l < '{0}' | tr -d ' '", counter.display());
    let source = CommandTokenSource::new(command);

    assert_eq!(source.get_token(false).await.unwrap(), "1");
    assert_eq!(source.get_token(false).await.unwrap(), "1");
    assert_eq!(source.get_token(true).await.unwrap(), "2");
    assert_eq!(source.get_token(false).await.unwrap(), "2");

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn empty_output_is_no_user() {
    let source = CommandTokenSource::new("true");
    assert_eq!(source.get_token(false).await, Err(TokenError::NoUser));
}

#[tokio::test]
async fn failing_command_is_a_provider_error_and_clears_cache() {
    let source = CommandTokenSource::new("echo tok; exit 3");
    assert!(matches!(source.get_token(false).await, Err(TokenError::Provider(_))));
    assert_eq!(source.current_user(), None);
}

#[tokio::test]
async fn current_user_appears_after_first_token() {
    let source = CommandTokenSource::new("echo tok");
    assert_eq!(source.current_user(), None);
    source.get_token(false).await.unwrap();
    assert_eq!(source.current_user().map(|u| u.uid), Some(COMMAND_SUBJECT.to_owned()));
}

#[test]
fn subscription_reports_current_state_once() {
    let source = CommandTokenSource::new("echo tok");
    let calls = Rc::new(Cell::new(0));
    let seen = Rc::clone(&calls);
    let _subscription = source.on_auth_state_changed(Box::new(move |user| {
        assert!(user.is_none());
        seen.set(seen.get() + 1);
    }));
    assert_eq!(calls.get(), 1);
}
