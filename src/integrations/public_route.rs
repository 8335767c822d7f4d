//! Public route snapshot and Traefik route configuration
//!
//! The user is redirected to the public URL and the workload sets secure
//! cookies, so the URL handed to the workload is always HTTPS without an
//! explicit port. Traefik serves HTTPS on 443 regardless of what the route
//! provider reports.

use minijinja::{context, Environment, UndefinedBehavior};
use tracing::{error, info, warn};
use url::{Position, Url};

use crate::relation::{RelationState, Relations};
use crate::{Error, APPLICATION_PORT, PUBLIC_ROUTE_RELATION_NAME};

const ROUTE_TEMPLATE_NAME: &str = "public-route";
const ROUTE_TEMPLATE: &str = include_str!("../../templates/public-route.json.j2");

/// The data published on the `public-route` relation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublicRouteData {
    /// Whether the route provider published an external host
    pub ready: bool,
    /// Externally reachable host, possibly with a port
    pub external_host: String,
    /// Scheme the route provider reports
    pub scheme: String,
}

impl PublicRouteData {
    /// Load the snapshot from the current relation data
    pub fn load(relations: &dyn Relations) -> Self {
        Self::from_state(RelationState::observe(relations, PUBLIC_ROUTE_RELATION_NAME))
    }

    fn from_state(state: RelationState) -> Self {
        let data = match state {
            RelationState::NotEstablished => {
                info!(relation = PUBLIC_ROUTE_RELATION_NAME, "no relation found");
                return Self::default();
            }
            RelationState::Established(data) => data,
        };

        let Some(external_host) = data.get("external_host").filter(|h| !h.is_empty()) else {
            error!("External hostname is not set on the ingress provider");
            return Self::default();
        };
        let scheme = data
            .get("scheme")
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| "http".to_string());

        if let Err(e) = normalise_url(&format!("{scheme}://{external_host}")) {
            error!(error = %e, "External hostname is not a valid URL host");
            return Self::default();
        }

        Self {
            ready: true,
            external_host: external_host.clone(),
            scheme,
        }
    }

    /// The URL as published by the route provider, empty when not ready
    pub fn url(&self) -> String {
        if !self.ready {
            return String::new();
        }
        format!("{}://{}", self.scheme, self.external_host)
    }

    /// The URL users reach the login UI on, empty when not ready
    pub fn domain_url(&self) -> String {
        if !self.ready {
            return String::new();
        }
        normalise_url(&self.url()).unwrap_or_else(|e| {
            warn!(error = %e, "public url cannot be normalised");
            String::new()
        })
    }

    /// Whether the route provider terminates TLS itself
    pub fn secured(&self) -> bool {
        self.ready && self.scheme == "https"
    }

    /// Render the Traefik route configuration submitted on the relation
    ///
    /// Returns compact JSON. Only meaningful once the snapshot is ready.
    pub fn route_config(&self, model: &str, app: &str) -> Result<String, Error> {
        let url = self.url();
        let parsed = Url::parse(&url).map_err(|e| Error::invalid_url(&url, e.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::invalid_url(&url, "missing host"))?;

        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_template(ROUTE_TEMPLATE_NAME, ROUTE_TEMPLATE)
            .map_err(|e| Error::template(ROUTE_TEMPLATE_NAME, e.to_string()))?;

        let rendered = env
            .get_template(ROUTE_TEMPLATE_NAME)
            .and_then(|t| {
                t.render(context! {
                    model => model,
                    app => app,
                    port => APPLICATION_PORT,
                    external_host => host,
                })
            })
            .map_err(|e| Error::template(ROUTE_TEMPLATE_NAME, e.to_string()))?;

        // Round-trip through serde_json so a broken template never reaches Traefik
        let value: serde_json::Value = serde_json::from_str(&rendered)
            .map_err(|e| Error::template(ROUTE_TEMPLATE_NAME, e.to_string()))?;
        Ok(value.to_string())
    }
}

/// Convert a URL to the HTTPS URL users are redirected to
///
/// The scheme is forced to `https`; the port and any credentials are dropped
/// from the authority. The path, query and fragment are kept.
///
/// ```
/// use login_ui_operator::integrations::normalise_url;
///
/// assert_eq!(normalise_url("http://ingress:80").unwrap(), "https://ingress");
/// assert_eq!(
///     normalise_url("http://ingress:80/path/sub").unwrap(),
///     "https://ingress/path/sub"
/// );
/// ```
///
/// # Errors
///
/// [`Error::InvalidUrl`] when the URL does not parse, has no host, or its
/// scheme cannot be switched to `https`.
pub fn normalise_url(raw: &str) -> Result<String, Error> {
    let mut url = Url::parse(raw).map_err(|e| Error::invalid_url(raw, e.to_string()))?;
    if url.host_str().is_none() {
        return Err(Error::invalid_url(raw, "missing host"));
    }

    let secure = |url: &mut Url| -> Result<(), ()> {
        url.set_scheme("https")?;
        url.set_port(None)?;
        url.set_username("")?;
        url.set_password(None)
    };
    secure(&mut url).map_err(|()| Error::invalid_url(raw, "cannot be served over https"))?;

    // The parser always yields a root path; keep it only when it was written
    let written_root = raw
        .split(&['?', '#'][..])
        .next()
        .is_some_and(|before_query| before_query.ends_with('/'));
    if url.path() == "/" && !written_root {
        return Ok(format!(
            "{}{}",
            &url[..Position::BeforePath],
            &url[Position::AfterPath..]
        ));
    }
    Ok(url.into())
}
