// Licensed under the Apache-2.0 license

//! Shared ATE (Automated Test Equipment) tab-separated image parser used by
//! every MPS family (spec.md 4.4.3), grounded on
//! `original_source/i2c-vr/mps/mps.cpp`.
//!
//! Columns: `ConfigID, Page, AddrHex, AddrDec, RegName, DataHex, DataDec,
//! WriteType`. Type0 images omit `WriteType` (7 columns); Type1 images
//! carry it (8 columns) and use it to distinguish plain register writes
//! from `Pn` process calls and `Bn` block writes.

use fwupd_core::error::DeviceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AteImageType {
    Type0,
    Type1,
}

#[derive(Debug, Clone)]
pub struct AteRow {
    pub config_id_token: String,
    pub page: u8,
    pub reg_name: String,
    pub addr: u8,
    pub data: Vec<u8>,
}

fn hex_u8(token: &str) -> Result<u8, DeviceError> {
    u8::from_str_radix(token.trim(), 16)
        .map_err(|_| DeviceError::InvalidImage(format!("not a hex byte: {token}")))
}

fn hex_u16(token: &str) -> Result<u16, DeviceError> {
    u16::from_str_radix(token.trim(), 16)
        .map_err(|_| DeviceError::InvalidImage(format!("not a hex word: {token}")))
}

/// Decode an ASCII hex byte string into up to 4 bytes, reversed so the
/// first hex-pair lands at the highest index (matches the C++ parser's
/// `data[byteCount - 1 - i]` placement).
fn reversed_hex_bytes(hex: &str, prefix: usize, out: &mut [u8; 4]) -> Result<usize, DeviceError> {
    let byte_count = (hex.len() / 2).min(4);
    for i in 0..byte_count {
        let pair = &hex[i * 2..i * 2 + 2];
        out[prefix + byte_count - 1 - i] = hex_u8(pair)?;
    }
    Ok(byte_count)
}

fn extract_type0(tokens: &[&str]) -> Result<Option<AteRow>, DeviceError> {
    if tokens.len() != 7 {
        return Ok(None);
    }
    let mut data = [0u8; 4];
    let byte_count = reversed_hex_bytes(tokens[5], 0, &mut data)?;
    Ok(Some(AteRow {
        config_id_token: tokens[0].to_string(),
        page: hex_u8(tokens[1])?,
        addr: hex_u8(tokens[2])?,
        reg_name: tokens[4].to_string(),
        data: data[..byte_count].to_vec(),
    }))
}

fn extract_type1(tokens: &[&str]) -> Result<Option<AteRow>, DeviceError> {
    if tokens.len() != 8 {
        return Ok(None);
    }
    let page = hex_u8(tokens[1])?;
    let reg_name = tokens[4].to_string();
    let config_id_token = tokens[0].to_string();
    let write_type = tokens[7].trim();

    if let Some(rest) = write_type.strip_prefix('P') {
        let _ = rest;
        let addr = hex_u16(tokens[2])?;
        let data_byte = hex_u8(tokens[5])?;
        return Ok(Some(AteRow {
            config_id_token,
            page,
            addr: ((addr & 0xFF00) >> 8) as u8,
            reg_name,
            data: vec![(addr & 0x00FF) as u8, data_byte],
        }));
    }

    let mut block_count = 0usize;
    if let Some(rest) = write_type.strip_prefix('B') {
        if let Ok(n) = rest.parse::<usize>() {
            block_count = n;
        }
    }

    let mut data = Vec::new();
    if block_count > 0 {
        data.push(block_count as u8);
    }
    let mut buf = [0u8; 4];
    let byte_count = reversed_hex_bytes(tokens[5], 0, &mut buf)?;
    data.extend_from_slice(&buf[..byte_count]);

    Ok(Some(AteRow {
        config_id_token,
        page,
        addr: hex_u8(tokens[2])?,
        reg_name,
        data,
    }))
}

pub fn parse_ate(text: &str, image_type: AteImageType) -> Result<Vec<AteRow>, DeviceError> {
    let mut rows = Vec::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split('\t').collect();
        if tokens[0].starts_with("END") {
            break;
        }
        if tokens[0].starts_with('*') {
            continue;
        }
        let row = match image_type {
            AteImageType::Type0 => extract_type0(&tokens)?,
            AteImageType::Type1 => extract_type1(&tokens)?,
        };
        if let Some(row) = row {
            rows.push(row);
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_type0_row() {
        let text = "00\t00\t0A\t10\tTRIM_MFR_PRODUCT_ID2\tAABB\t0\t\nEND\n";
        let rows = parse_ate(text, AteImageType::Type0).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reg_name, "TRIM_MFR_PRODUCT_ID2");
        assert_eq!(rows[0].data, vec![0xBB, 0xAA]);
    }

    #[test]
    fn process_call_write_type_splits_cmd_and_data() {
        let text = "00\t00\t0F11\t0\tSOME_REG\t18\t0\tP1\nEND\n";
        let rows = parse_ate(text, AteImageType::Type1).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].addr, 0x0F);
        assert_eq!(rows[0].data, vec![0x11, 0x18]);
    }

    #[test]
    fn block_write_prefixes_byte_count() {
        let text = "00\t00\t0A\t0\tSOME_REG\tAABB\t0\tB2\nEND\n";
        let rows = parse_ate(text, AteImageType::Type1).unwrap();
        assert_eq!(rows[0].data, vec![2, 0xBB, 0xAA]);
    }

    #[test]
    fn stops_at_end_tag() {
        let text = "END\n00\t00\t0A\t0\tSOME_REG\tAA\t0\t\n";
        let rows = parse_ate(text, AteImageType::Type0).unwrap();
        assert!(rows.is_empty());
    }
}
