//! CSV importers: channel map (LCN → Hz), group list
//! (TG → name, mode), and key lists (decimal or hex). These are small,
//! line-oriented formats with no quoting/escaping requirements in practice
//! (matching the upstream C parser's behavior), so this module parses them
//! directly rather than pulling in a general CSV dialect engine.

use std::collections::HashMap;
use std::path::Path;

use crate::errors::{ConfigError, Result};

/// Group-list call mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMode {
    /// Analog.
    A,
    /// Digital.
    B,
    /// Digital, encrypted.
    D,
    /// Digital, encrypted, data.
    De,
}

impl GroupMode {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Some(GroupMode::A),
            "B" => Some(GroupMode::B),
            "D" => Some(GroupMode::D),
            "DE" => Some(GroupMode::De),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupEntry {
    pub tg: u32,
    pub name: String,
    pub mode: Option<GroupMode>,
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Parses decimal or `0x`-prefixed hex integers, matching the loose numeric
/// convention the upstream importers accept.
fn parse_int(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        s.parse::<u64>().ok()
    }
}

/// Imports a channel map CSV: `LCN,FREQ_HZ` one pair per line.
pub fn import_channel_map(path: &Path) -> Result<HashMap<u16, u64>> {
    let mut map = HashMap::new();
    for line in read_lines(path)? {
        let mut fields = line.split(',');
        let (Some(lcn_s), Some(freq_s)) = (fields.next(), fields.next()) else {
            continue;
        };
        if let (Some(lcn), Some(freq)) = (parse_int(lcn_s), parse_int(freq_s)) {
            map.insert(lcn as u16, freq);
        }
    }
    Ok(map)
}

/// Imports a group list CSV: `TG,NAME[,MODE]` per line.
pub fn import_group_list(path: &Path) -> Result<Vec<GroupEntry>> {
    let mut out = Vec::new();
    for line in read_lines(path)? {
        let mut fields = line.splitn(3, ',');
        let Some(tg_s) = fields.next() else { continue };
        let Some(tg) = parse_int(tg_s) else { continue };
        let name = fields.next().unwrap_or("").trim().to_string();
        let mode = fields.next().and_then(GroupMode::parse);
        out.push(GroupEntry { tg: tg as u32, name, mode });
    }
    Ok(out)
}

/// Imports a key list CSV: `ID,KEY` (decimal or hex key) per line, keyed by
/// the talkgroup/radio ID the key applies to.
pub fn import_key_list(path: &Path) -> Result<HashMap<u32, u64>> {
    let mut map = HashMap::new();
    for line in read_lines(path)? {
        let mut fields = line.split(',');
        let (Some(id_s), Some(key_s)) = (fields.next(), fields.next()) else {
            continue;
        };
        if let (Some(id), Some(key)) = (parse_int(id_s), parse_int(key_s)) {
            map.insert(id as u32, key);
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("dsd_neo_csv_{}_{}", std::process::id(), name));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn channel_map_parses_decimal_and_hex() {
        let path = write_temp("chmap.csv", "1,851012500\n2,0x32C2D5A4\n# comment\n");
        let map = import_channel_map(&path).unwrap();
        assert_eq!(map.get(&1), Some(&851012500));
        assert_eq!(map.get(&2), Some(&0x32C2D5A4));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn group_list_parses_mode() {
        let path = write_temp("groups.csv", "4567,Dispatch,D\n1000,Analog Mutual Aid,A\n");
        let entries = import_group_list(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].tg, 4567);
        assert_eq!(entries[0].name, "Dispatch");
        assert_eq!(entries[0].mode, Some(GroupMode::D));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn key_list_parses_hex_keys() {
        let path = write_temp("keys.csv", "1234,0xDEADBEEF\n");
        let keys = import_key_list(&path).unwrap();
        assert_eq!(keys.get(&1234), Some(&0xDEADBEEFu64));
        std::fs::remove_file(path).ok();
    }
}
