//! Integration tests for lmsdrive-api
//!
//! Uses wiremock to simulate the identity endpoint, the token endpoint and
//! the document API, and verifies end-to-end behavior of the login flow,
//! the token broker, discovery listings and downloads.


mod test_auth;
mod test_discovery;
mod test_download;
