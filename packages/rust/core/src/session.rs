//! Server-session scoping and the warn-and-continue policy for REST steps.

use std::future::Future;

use tracing::warn;
use xnatkit_client::XnatClient;
use xnatkit_shared::{Result, XnatKitError};

/// Run `work` inside one server session.
///
/// The session is closed whether `work` succeeds or fails; a failure to
/// close is only logged so it never masks the outcome of `work`.
pub async fn scoped<T>(client: &XnatClient, work: impl Future<Output = Result<T>>) -> Result<T> {
    client.connect().await?;
    let outcome = work.await;
    if let Err(e) = client.disconnect().await {
        warn!(error = %e, "failed to close the server session");
    }
    outcome
}

/// Fail with an XNAT error unless `path` answers 200.
pub(crate) async fn require(client: &XnatClient, path: &str, what: &str) -> Result<()> {
    let status = client.resource_status(path).await?;
    if status != 200 {
        return Err(XnatKitError::xnat_status(
            status,
            format!("{what} is unreachable at {}", client.url(path)),
        ));
    }
    Ok(())
}

/// Downgrade an XNAT-class error to a warning.
///
/// Returns `Ok(None)` after logging when `result` failed on the server
/// side; any other error is passed through.
pub(crate) fn tolerate<T>(result: Result<T>, step: &str) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_xnat() => {
            warn!(step, error = %e, "XNAT step failed, continuing");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use xnatkit_client::ClientOptions;

    #[tokio::test]
    async fn session_is_closed_after_failed_work() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/data/JSESSION"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ABC123"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/data/JSESSION"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = XnatClient::new(&ClientOptions::new(server.uri(), "jdoe", "secret")).unwrap();
        let outcome: Result<()> =
            scoped(&client, async { Err(XnatKitError::validation("bad input")) }).await;
        assert!(matches!(outcome, Err(XnatKitError::Validation { .. })));
    }

    #[tokio::test]
    async fn failed_login_skips_work() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/data/JSESSION"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = XnatClient::new(&ClientOptions::new(server.uri(), "jdoe", "wrong")).unwrap();
        let outcome = scoped(&client, async { Ok::<_, XnatKitError>(42) }).await;
        assert_eq!(outcome.unwrap_err().status(), Some(401));
    }

    #[test]
    fn only_xnat_errors_are_tolerated() {
        let soft = tolerate::<()>(Err(XnatKitError::xnat_status(409, "exists")), "add subject");
        assert!(matches!(soft, Ok(None)));

        let hard = tolerate::<()>(Err(XnatKitError::parse("broken header")), "add subject");
        assert!(hard.is_err());

        assert_eq!(tolerate(Ok(7), "x").unwrap(), Some(7));
    }
}
