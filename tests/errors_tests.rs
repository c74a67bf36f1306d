use std::error::Error;
use std::time::Duration;

use shortsbot::errors::{
    BlobStoreError, DecodeError, DeliveryError, FetchError, HandlingError, PublishError,
};

#[test]
fn test_errors_implement_error_trait() {
    fn assert_error<T: Error + Send + Sync + 'static>() {}

    assert_error::<PublishError>();
    assert_error::<DecodeError>();
    assert_error::<FetchError>();
    assert_error::<DeliveryError>();
    assert_error::<HandlingError>();
}

#[test]
fn test_error_display() {
    let error = PublishError::Timeout(Duration::from_secs(5));
    assert_eq!(format!("{error}"), "Timed out publishing task after 5s");

    let error = DeliveryError::Api("sendVideo failed".to_string());
    assert_eq!(format!("{error}"), "Chat API rejected request: sendVideo failed");

    let error = DecodeError::MissingField {
        id: "t1".to_string(),
        field: "chat_id",
    };
    assert_eq!(format!("{error}"), "Result message t1 is missing chat_id");
}

#[test]
fn test_handling_error_is_transparent() {
    let fetch: FetchError = BlobStoreError::NotFound {
        bucket: "b".to_string(),
        key: "k".to_string(),
    }
    .into();
    let handling: HandlingError = fetch.into();
    assert_eq!(format!("{handling}"), "Object not found: b/k");

    let handling: HandlingError = FetchError::Timeout(Duration::from_secs(300)).into();
    assert!(matches!(handling, HandlingError::Fetch(FetchError::Timeout(_))));
}
