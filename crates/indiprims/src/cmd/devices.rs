use indiprims_client::interface;

use crate::cmd::session;
use crate::cmd::{DevicesArgs, ServerArgs};
use crate::exit::{client_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_devices, DeviceRow, OutputFormat};

pub fn run(args: DevicesArgs, server: &ServerArgs, format: OutputFormat) -> CliResult<i32> {
    let mask = args
        .interface
        .as_deref()
        .map(|input| {
            interface::parse_mask(input)
                .ok_or_else(|| CliError::new(USAGE, format!("unknown driver interface: {input}")))
        })
        .transpose()?;
    let window = session::parse_duration(&args.settle)?;

    let running = session::install_ctrlc_handler()?;
    let mut conn = session::open(server)?;
    conn.try_request_properties(None)
        .map_err(|err| client_error("getProperties failed", err))?;
    session::settle(&mut conn, window, &running, |_| false)?;

    let rows: Vec<DeviceRow> = match mask {
        Some(mask) => conn
            .registry()
            .filter_by_interface(mask)
            .into_iter()
            .map(DeviceRow::from_device)
            .collect(),
        None => conn.registry().all().map(DeviceRow::from_device).collect(),
    };
    print_devices(&rows, format);

    conn.disconnect();
    Ok(SUCCESS)
}
