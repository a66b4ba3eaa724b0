/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Subject derivation from rendered content.
//!
//! When a stored subject is empty, the subject is derived at send time from
//! the rendered body: an HTML `<title>` wins; otherwise the first line of
//! the content, trimmed and truncated to 40 characters with a `...` marker.

use once_cell::sync::Lazy;
use regex::Regex;

const SUBJECT_TRUNCATE_CHARS: usize = 40;

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());

/// Derives a subject line from rendered email content.
///
/// Returns an empty string if the content has no usable text.
pub fn extract_subject(content: &str) -> String {
    if let Some(captures) = TITLE_RE.captures(content) {
        if let Some(title) = captures.get(1) {
            let title = title.as_str().trim();
            if !title.is_empty() {
                return title.to_string();
            }
        }
    }

    match content.lines().next() {
        Some(line) => truncate_with_ellipsis(line.trim()),
        None => String::new(),
    }
}

fn truncate_with_ellipsis(line: &str) -> String {
    let mut chars = line.char_indices();
    match chars.nth(SUBJECT_TRUNCATE_CHARS) {
        // More than 40 characters: cut at the 40th and mark the cut.
        Some((byte_index, _)) => format!("{}...", &line[..byte_index]),
        None => line.to_string(),
    }
}
