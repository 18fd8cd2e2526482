//! Request-processing wrappers.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Request ID
//! 2. Panic recovery and error relaying
//! 3. Request logging
//! 4. Default and security headers
//! 5. CORS
//! 6. Compression
//! 7. Content negotiation
//! 8. HTTPS enforcement, `SameSite` rewriting
//! 9. Cookie integrity
//! 10. Rate limiting
//! 11. CSRF
//! 12. Method allow-lists (per route)
//! 13. Authentication
//! 14. Context injection
//! 15. Input validation
//! 16. Authorization gates
//! 17. Security, query and transaction logging
//!
//! [`crate::pipeline`] assembles them in this order.

pub mod auth;
pub mod authorize;
pub mod compress;
pub mod cookie_security;
pub mod cors;
pub mod csrf;
pub mod defaults;
pub mod inject;
pub mod logging;
pub mod method;
pub mod negotiate;
pub mod rate_limit;
pub mod recover;
pub mod request_id;
pub mod security_headers;
pub mod validate;

pub use auth::{authenticate, optional_auth, require_auth};
pub use authorize::{
    require_database_access, require_delete_permission, require_insert_permission,
    require_select_permission, require_table_access, require_update_permission,
};
pub use compress::compression_layer;
pub use cookie_security::{enforce_same_site_cookie, require_https_for_cookies, validate_cookie_integrity};
pub use cors::cors_layer;
pub use csrf::{CsrfToken, issue_csrf_token, prevent_csrf};
pub use defaults::default_headers;
pub use inject::{inject_metadata, inject_session, inject_transaction, inject_user, inject_user_permissions};
pub use logging::{log_query_execution, log_request, log_security_events, log_transaction_events};
pub use method::{AllowedMethods, validate_http_method};
pub use negotiate::{NegotiatedType, content_negotiation};
pub use rate_limit::{RateLimiter, rate_limit};
pub use recover::{handle_errors, recover_from_panic};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
pub use validate::{validate_query_params, validate_request_body, validate_sql_query, validate_where_clause};
