use indiprims_client::{command, PropertyVector};

use crate::cmd::session;
use crate::cmd::{GetArgs, ServerArgs};
use crate::exit::{client_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_vectors, OutputFormat};

pub fn run(args: GetArgs, server: &ServerArgs, format: OutputFormat) -> CliResult<i32> {
    let window = session::parse_duration(&args.settle)?;

    let running = session::install_ctrlc_handler()?;
    let mut conn = session::open(server)?;
    let request = match args.property.as_deref() {
        Some(property) => command::get_property(&args.device, property),
        None => command::get_properties(Some(&args.device)),
    };
    conn.send(&request)
        .map_err(|err| client_error("getProperties failed", err))?;

    let property = args.property.as_deref();
    session::settle(&mut conn, window, &running, |conn| match property {
        Some(property) => conn.registry().vector(&args.device, property).is_some(),
        None => false,
    })?;

    let device = conn.registry().get(&args.device).ok_or_else(|| {
        CliError::new(
            DATA_INVALID,
            format!("device '{}' was not announced by {}", args.device, conn.server()),
        )
    })?;
    let vectors: Vec<&PropertyVector> = match property {
        Some(property) => vec![device.property(property).ok_or_else(|| {
            CliError::new(
                DATA_INVALID,
                format!("device '{}' has no property '{property}'", args.device),
            )
        })?],
        None => device.properties().collect(),
    };
    print_vectors(&vectors, format);

    conn.disconnect();
    Ok(SUCCESS)
}
