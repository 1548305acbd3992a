//! Security policy route

use crate::AppState;
use axum::{extract::State, http::header, response::IntoResponse};
use chrono::NaiveDate;
use std::sync::Arc;

/// GET /api/security-policy
///
/// Plain-text vulnerability disclosure policy.
pub async fn security_policy_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = render_policy(
        &state.config.security.contact_email,
        chrono::Utc::now().date_naive(),
    );

    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body)
}

pub fn render_policy(contact_email: &str, updated: NaiveDate) -> String {
    format!(
        "# Security Policy

## Reporting Security Vulnerabilities

If you discover a security vulnerability in this application, please report it to:

**Email:** {contact_email}

## What to Include

When reporting a security issue, please include:

1. A description of the vulnerability
2. Steps to reproduce the issue
3. Potential impact assessment
4. Any suggested fixes (if available)

## Response Timeline

- **Acknowledgment:** Within 24 hours
- **Initial Assessment:** Within 72 hours
- **Resolution:** Varies based on severity

## Scope

This security policy applies to:
- The main application (URL Scanner)
- All API endpoints
- Client-side components

## Out of Scope

- Third-party services (VirusTotal, Telegram)
- Infrastructure provided by the hosting platform
- Social engineering attacks

## Responsible Disclosure

We follow responsible disclosure practices:
1. Report the issue privately
2. Allow reasonable time for fixes
3. Coordinate public disclosure

Thank you for helping keep our application secure!

---
Contact: {contact_email}
Last Updated: {updated}",
        updated = updated.format("%Y-%m-%d"),
    )
}
