use indiprims_client::{command, ClientEvent};
use indiprims_wire::{parse_number, SwitchState, VectorKind};

use crate::cmd::session;
use crate::cmd::{ServerArgs, SetArgs};
use crate::exit::{client_error, CliError, CliResult, DATA_INVALID, FAILURE, SUCCESS, USAGE};
use crate::output::{print_vectors, OutputFormat};

pub fn run(args: SetArgs, server: &ServerArgs, format: OutputFormat) -> CliResult<i32> {
    let window = session::parse_duration(&args.settle)?;
    let assignments = parse_assignments(&args.elements)?;
    let (device, property) = (args.device.as_str(), args.property.as_str());

    let running = session::install_ctrlc_handler()?;
    let mut conn = session::open(server)?;
    conn.send(&command::get_property(device, property))
        .map_err(|err| client_error("getProperties failed", err))?;
    session::settle(&mut conn, window, &running, |conn| {
        conn.registry().vector(device, property).is_some()
    })?;

    let announced = conn.registry().vector(device, property).map(|v| v.kind());
    let kind = match (requested_kind(&args), announced) {
        (Some(kind), _) | (None, Some(kind)) => kind,
        (None, None) => {
            return Err(CliError::new(
                DATA_INVALID,
                format!("device '{device}' did not announce property '{property}'"),
            ))
        }
    };
    session::drain(&mut conn);

    let sent = match kind {
        VectorKind::Switch => {
            let values = parse_switches(&assignments)?;
            conn.try_send_switch(device, property, values)
        }
        VectorKind::Number => {
            let values = parse_numbers(&assignments)?;
            conn.try_send_number(device, property, values)
        }
        VectorKind::Text => conn.try_send_text(
            device,
            property,
            assignments
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_str())),
        ),
        other => {
            return Err(CliError::new(
                USAGE,
                format!("{other} vectors cannot be set from the command line"),
            ))
        }
    };
    sent.map_err(|err| client_error("set failed", err))?;

    session::settle(&mut conn, window, &running, |conn| {
        conn.events().iter().any(|event| {
            matches!(event, ClientEvent::KindUpdated { device: d, name, .. } if d == device && name == property)
        })
    })?;

    let Some(vector) = conn.registry().vector(device, property) else {
        return Err(CliError::new(
            DATA_INVALID,
            format!("property '{property}' was removed while waiting for the driver"),
        ));
    };
    print_vectors(&[vector], format);
    let code = if vector.state() == Some("Alert") {
        FAILURE
    } else {
        SUCCESS
    };

    conn.disconnect();
    Ok(code)
}

fn requested_kind(args: &SetArgs) -> Option<VectorKind> {
    if args.switch {
        Some(VectorKind::Switch)
    } else if args.number {
        Some(VectorKind::Number)
    } else if args.text {
        Some(VectorKind::Text)
    } else {
        None
    }
}

fn parse_assignments(inputs: &[String]) -> CliResult<Vec<(String, String)>> {
    inputs
        .iter()
        .map(|input| match input.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.to_string()))
            }
            _ => Err(CliError::new(
                USAGE,
                format!("expected NAME=VALUE, got '{input}'"),
            )),
        })
        .collect()
}

fn parse_switches(assignments: &[(String, String)]) -> CliResult<Vec<(String, SwitchState)>> {
    assignments
        .iter()
        .map(|(name, value)| {
            let state = value
                .parse::<SwitchState>()
                .map_err(|err| CliError::new(USAGE, format!("{name}: {err}")))?;
            Ok((name.clone(), state))
        })
        .collect()
}

fn parse_numbers(assignments: &[(String, String)]) -> CliResult<Vec<(String, f64)>> {
    assignments
        .iter()
        .map(|(name, value)| {
            let number = parse_number(value)
                .ok_or_else(|| CliError::new(USAGE, format!("{name}: '{value}' is not a number")))?;
            Ok((name.clone(), number))
        })
        .collect()
}
