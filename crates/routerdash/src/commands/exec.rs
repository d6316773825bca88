//! `exec`: raw API command passthrough.

use routerdash_core::{DeviceClient, Params};

use crate::cli::ExecArgs;
use crate::error::CliError;
use crate::output::{self, Render};

/// `key=value` words into API attributes. Keys may carry the leading `=`
/// or `?` of the wire form; a bare key means an empty value.
pub(crate) fn parse_params(words: &[String]) -> Result<Params, CliError> {
    let mut params = Params::new();
    for word in words {
        let word = word.strip_prefix('=').unwrap_or(word);
        let (key, value) = word.split_once('=').unwrap_or((word, ""));
        if key.is_empty() {
            return Err(CliError::Validation {
                field: "params".into(),
                reason: format!("'{word}' has no attribute name"),
            });
        }
        params.insert(key.to_owned(), value.to_owned());
    }
    Ok(params)
}

pub async fn handle(client: &DeviceClient, args: ExecArgs, render: &Render) -> Result<(), CliError> {
    if !args.command.starts_with('/') {
        return Err(CliError::Validation {
            field: "command".into(),
            reason: format!("'{}' must start with '/'", args.command),
        });
    }
    let params = parse_params(&args.params)?;
    let rows = client
        .execute(&args.command, (!params.is_empty()).then_some(params))
        .await?;
    output::print_output(&output::render_rows(render.format, &rows)?, render.quiet);
    Ok(())
}
