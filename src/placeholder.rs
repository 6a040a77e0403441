//! Literal placeholder substitution applied while composing staging trees.

use crate::config::PlaceholderRule;
use crate::error::{Error, Result};
use crate::flavor::Flavor;
use crate::renderer::TemplateRenderer;
use log::warn;

/// Upper bound on substitution passes over one line.
const MAX_PASSES: usize = 32;

/// Ordered literal replacements.
///
/// No key is a substring of another key or of any replacement value, so at
/// most one key matches at any position. A pass scans left to right and never
/// rescans replaced text, which makes the result independent of rule order.
/// Passes repeat until the text is stable, so applying the map twice equals
/// applying it once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceholderMap {
    rules: Vec<(String, String)>,
}

impl PlaceholderMap {
    /// Builds a map from literal pairs.
    ///
    /// # Errors
    /// * `Error::ConfigError` for an empty key, a key overlapping another key,
    ///   or a key that reappears inside a replacement value
    pub fn new<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let rules: Vec<(String, String)> =
            pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();

        for (index, (key, _)) in rules.iter().enumerate() {
            if key.is_empty() {
                return Err(Error::ConfigError("placeholder keys must not be empty".to_string()));
            }
            for (other_index, (other_key, value)) in rules.iter().enumerate() {
                if index != other_index && other_key.contains(key.as_str()) {
                    return Err(Error::ConfigError(format!(
                        "placeholder '{key}' overlaps placeholder '{other_key}'"
                    )));
                }
                if value.contains(key.as_str()) {
                    return Err(Error::ConfigError(format!(
                        "placeholder '{key}' reappears in replacement '{value}'"
                    )));
                }
            }
        }
        Ok(Self { rules })
    }

    /// Renders each rule's replacement against `{ version, flavor }` and builds the map.
    pub fn from_rules(
        rules: &[PlaceholderRule],
        renderer: &dyn TemplateRenderer,
        version: &str,
        flavor: Flavor,
    ) -> Result<Self> {
        let context = serde_json::json!({ "version": version, "flavor": flavor });
        let pairs = rules
            .iter()
            .map(|rule| Ok((rule.from.clone(), renderer.render(&rule.to, &context)?)))
            .collect::<Result<Vec<_>>>()?;
        Self::new(pairs)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// One left-to-right pass; replaced text is not scanned again.
    fn substitute(&self, line: &str) -> String {
        let mut result = String::with_capacity(line.len());
        let mut rest = line;
        loop {
            let next = self
                .rules
                .iter()
                .filter_map(|(from, to)| rest.find(from.as_str()).map(|index| (index, from, to)))
                .min_by_key(|(index, _, _)| *index);
            match next {
                Some((index, from, to)) => {
                    result.push_str(&rest[..index]);
                    result.push_str(to);
                    rest = &rest[index + from.len()..];
                }
                None => {
                    result.push_str(rest);
                    return result;
                }
            }
        }
    }

    /// Applies the replacements to one line until it no longer changes.
    pub fn apply_line(&self, line: &str) -> String {
        let mut current = line.to_string();
        for _ in 0..MAX_PASSES {
            let next = self.substitute(&current);
            if next == current {
                return current;
            }
            current = next;
        }
        warn!("Placeholder substitution did not settle after {MAX_PASSES} passes: {line}");
        current
    }

    /// Applies the map line by line, keeping line terminators intact.
    pub fn apply(&self, text: &str) -> String {
        if self.is_empty() {
            return text.to_string();
        }
        text.split_inclusive('\n')
            .map(|line| match line.strip_suffix('\n') {
                Some(content) => {
                    let mut replaced = self.apply_line(content);
                    replaced.push('\n');
                    replaced
                }
                None => self.apply_line(line),
            })
            .collect()
    }
}
