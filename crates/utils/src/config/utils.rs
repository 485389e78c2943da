/*
 * Copyright (c) 2023 Stalwart Labs Ltd.
 *
 * This file is part of the Stalwart Mail Warmer.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of
 * the License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 * in the LICENSE file at the top-level directory of this distribution.
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 *
 * You can be released from the requirements of the AGPLv3 license by
 * purchasing a commercial license. Please contact licensing@stalw.art
 * for more details.
*/

use std::time::Duration;

use super::{Config, Result};

impl Config {
    pub fn property<T: ParseValue>(&self, key: impl AsKey) -> Result<Option<T>> {
        let key = key.as_key();
        if let Some(value) = self.keys.get(&key) {
            T::parse_value(&key, value).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn property_or_static<T: ParseValue>(&self, key: impl AsKey, default: &str) -> Result<T> {
        let key = key.as_key();
        let value = self.keys.get(&key).map(|v| v.as_str()).unwrap_or(default);
        T::parse_value(&key, value)
    }

    pub fn property_require<T: ParseValue>(&self, key: impl AsKey) -> Result<T> {
        let key = key.as_key();
        if let Some(value) = self.keys.get(&key) {
            T::parse_value(&key, value)
        } else {
            Err(format!("Missing configuration key {key:?}."))
        }
    }
}

pub trait AsKey: Clone {
    fn as_key(&self) -> String;
}

impl AsKey for &str {
    fn as_key(&self) -> String {
        self.to_string()
    }
}

impl AsKey for String {
    fn as_key(&self) -> String {
        self.clone()
    }
}

impl AsKey for (&str, &str) {
    fn as_key(&self) -> String {
        format!("{}.{}", self.0, self.1)
    }
}

impl AsKey for (&str, &str, &str) {
    fn as_key(&self) -> String {
        format!("{}.{}.{}", self.0, self.1, self.2)
    }
}

pub trait ParseValue: Sized {
    fn parse_value(key: &str, value: &str) -> Result<Self>;
}

impl ParseValue for String {
    fn parse_value(_key: &str, value: &str) -> Result<Self> {
        Ok(value.to_string())
    }
}

impl ParseValue for bool {
    fn parse_value(key: &str, value: &str) -> Result<Self> {
        value
            .parse()
            .map_err(|_| format!("Invalid boolean value {value:?} for key {key:?}."))
    }
}

impl ParseValue for Duration {
    fn parse_value(key: &str, value: &str) -> Result<Self> {
        let duration = value.trim().to_ascii_lowercase();
        let (num, multiplier) = if let Some(num) = duration.strip_suffix("ms") {
            (num, 1)
        } else if let Some(num) = duration.strip_suffix('s') {
            (num, 1000)
        } else if let Some(num) = duration.strip_suffix('m') {
            (num, 60 * 1000)
        } else if let Some(num) = duration.strip_suffix('h') {
            (num, 60 * 60 * 1000)
        } else if let Some(num) = duration.strip_suffix('d') {
            (num, 24 * 60 * 60 * 1000)
        } else {
            (duration.as_str(), 1)
        };
        num.trim()
            .parse::<u64>()
            .ok()
            .and_then(|num| {
                if num > 0 {
                    Some(Duration::from_millis(num * multiplier))
                } else {
                    None
                }
            })
            .ok_or_else(|| format!("Invalid duration value {value:?} for key {key:?}."))
    }
}

macro_rules! impl_parse_number {
    ($($t:ty),*) => {
        $(
            impl ParseValue for $t {
                fn parse_value(key: &str, value: &str) -> Result<Self> {
                    value.trim().parse().map_err(|_| {
                        format!("Invalid numeric value {value:?} for key {key:?}.")
                    })
                }
            }
        )*
    };
}

impl_parse_number!(u16, u32, u64, usize, i32, i64);

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ParseValue;
    use crate::config::Config;

    #[test]
    fn parse_durations() {
        for (value, expected) in [
            ("100ms", Duration::from_millis(100)),
            ("5s", Duration::from_secs(5)),
            ("2m", Duration::from_secs(120)),
            ("12h", Duration::from_secs(43200)),
            ("2d", Duration::from_secs(172800)),
            ("250", Duration::from_millis(250)),
        ] {
            assert_eq!(Duration::parse_value("test", value).unwrap(), expected);
        }
        assert!(Duration::parse_value("test", "0s").is_err());
        assert!(Duration::parse_value("test", "five").is_err());
    }

    #[test]
    fn typed_properties() {
        let mut config = Config::default();
        config.set("queue.url", "https://sqs.example.com/queue");
        config.set("schedule.ingest-interval", "2m");
        config.set("store.redis.pool.max-connections", "10");

        assert_eq!(
            config.value_require("queue.url").unwrap(),
            "https://sqs.example.com/queue"
        );
        assert_eq!(
            config
                .property::<Duration>("schedule.ingest-interval")
                .unwrap(),
            Some(Duration::from_secs(120))
        );
        assert_eq!(
            config
                .property_or_static::<u64>("store.redis.pool.max-connections", "5")
                .unwrap(),
            10
        );
        assert_eq!(
            config
                .property_or_static::<u64>("store.redis.pool.min-connections", "5")
                .unwrap(),
            5
        );
        assert!(config.value_require(("schedule", "missing")).is_err());
    }
}
