//! `lpkg` binary entry point.
use std::process::ExitCode;

use lpkg::command;

fn main() -> ExitCode
{
	let clargs = command::parse();

	match command::run(clargs)
	{
		Ok(code) => code,
		Err(e) => {
			eprintln!("error: {e:#}");
			ExitCode::FAILURE
		},
	}
}
