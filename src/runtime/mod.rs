//! Upstream API clients and the runtime adapter driving background work.

pub mod models;
pub mod platform;
pub mod reporting;
pub mod tokio_spawner;

pub use models::*;
pub use platform::{ManifestCache, PlatformClient};
pub use reporting::ReportingClient;
pub use tokio_spawner::TokioSpawner;

use url::Url;

use crate::core::{NetworkReason, TransportError};

/// Append `segments` to `base`, percent-encoding each one.
pub(crate) fn endpoint<S: AsRef<str>>(
    base: &Url,
    segments: &[S],
    trailing_slash: bool,
) -> Result<Url, TransportError> {
    let mut url = base.clone();
    {
        let mut path = url.path_segments_mut().map_err(|()| TransportError::Network {
            reason: NetworkReason::Request,
            message: format!("base url `{base}` cannot carry a path"),
        })?;
        path.pop_if_empty().extend(segments.iter().map(AsRef::as_ref));
        if trailing_slash {
            path.push("");
        }
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_handles_base_with_and_without_path() {
        let host = Url::parse("https://www.bungie.net").unwrap();
        assert_eq!(
            endpoint(&host, &["Platform", "Destiny2", "Manifest"], true)
                .unwrap()
                .as_str(),
            "https://www.bungie.net/Platform/Destiny2/Manifest/"
        );

        let api = Url::parse("http://localhost:8080/api/").unwrap();
        assert_eq!(
            endpoint(&api, &["players", "a b"], false).unwrap().as_str(),
            "http://localhost:8080/api/players/a%20b"
        );
    }

    #[test]
    fn cannot_be_a_base_is_rejected() {
        let base = Url::parse("mailto:someone@example.com").unwrap();
        assert!(endpoint(&base, &["x"], false).is_err());
    }
}
