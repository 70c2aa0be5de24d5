//! JSON output for the CLI
//!
//! Every command prints exactly one JSON envelope line on stdout:
//! `{"status":"ok","data":…}` or `{"status":"error","code":…,"message":…}`.

use std::io::{self, Write};

use serde_json::{json, Value};

use super::errors::CliResult;

/// Write a success envelope around `data`
pub fn write_response(data: Value) -> CliResult<()> {
    emit(&mut io::stdout().lock(), &json!({ "status": "ok", "data": data }))
}

/// Write an error envelope
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    emit(
        &mut io::stdout().lock(),
        &json!({ "status": "error", "code": code, "message": message }),
    )
}

fn emit(out: &mut impl Write, envelope: &Value) -> CliResult<()> {
    serde_json::to_writer(&mut *out, envelope)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_is_one_line() {
        let mut out = Vec::new();
        emit(&mut out, &json!({ "status": "ok", "data": { "registered": ["ledger-db"] } }))
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with('\n'));
        assert_eq!(text.lines().count(), 1);
        let parsed: Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(parsed["data"]["registered"][0], "ledger-db");
    }
}
