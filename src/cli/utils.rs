use serde_json::{json, Value};
use crate::assembler::OutputRecord;
use crate::cli::OutputFormat;

/// Write the output record as the single JSON document on stdout
pub fn emit_record(record: &OutputRecord, pretty: bool) -> anyhow::Result<()> {
    println!("{}", record.to_json(pretty)?);
    Ok(())
}

/// Output a success message in the appropriate format
pub fn output_success(
    output_format: &OutputFormat,
    message: &str,
    data: Option<Value>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let (Some(target), Some(Value::Object(extra))) = (response.as_object_mut(), data) {
                target.extend(extra);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
            if let Some(Value::Object(extra)) = data {
                for (key, value) in extra {
                    match value {
                        Value::String(s) => println!("{}: {}", key, s),
                        Value::Null => println!("{}: -", key),
                        other => println!("{}: {}", key, other),
                    }
                }
            }
        }
    }
    Ok(())
}
