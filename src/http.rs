// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

use std::time::Duration;

/// Client shared by verification handshakes and every fan-out task.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(format!("cares-hub/{}", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
}
