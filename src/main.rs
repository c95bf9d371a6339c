// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

use clap::Parser;

use tanmi_dock::cli::{self, Cli};
use tanmi_dock::logging;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    if let Err(err) = cli::run(cli).await {
        eprintln!("{} {err}", err.prefix());
        std::process::exit(err.exit_code());
    }
}
