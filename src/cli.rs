// Copyright (c) 2025 Kassenbuch contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{Arg, ArgAction, Command, value_parser};

fn json_flags(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print as pretty JSON"),
    )
    .arg(
        Arg::new("jsonl")
            .long("jsonl")
            .action(ArgAction::SetTrue)
            .help("Print as JSON lines"),
    )
}

pub fn build_cli() -> Command {
    Command::new("kassenbuch")
        .about("Multi-account bookkeeping with CSV bank import and WebDAV backup sync")
        .version(clap::crate_version!())
        .subcommand(Command::new("init").about("Create the database"))
        .subcommand(
            Command::new("group")
                .about("Manage account groups")
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("name").long("name").required(true))
                        .arg(Arg::new("icon").long("icon"))
                        .arg(Arg::new("color").long("color")),
                )
                .subcommand(Command::new("list"))
                .subcommand(
                    Command::new("rm")
                        .arg(Arg::new("name").long("name").required(true))
                        .arg(
                            Arg::new("cascade")
                                .long("cascade")
                                .action(ArgAction::SetTrue)
                                .help("Also delete the group's accounts"),
                        ),
                ),
        )
        .subcommand(
            Command::new("account")
                .about("Manage accounts")
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("name").long("name").required(true))
                        .arg(
                            Arg::new("type")
                                .long("type")
                                .value_parser(["cash", "offline", "bank"])
                                .default_value("bank"),
                        )
                        .arg(Arg::new("group").long("group"))
                        .arg(Arg::new("icon").long("icon"))
                        .arg(Arg::new("color").long("color"))
                        .arg(
                            Arg::new("no_balance")
                                .long("no-balance")
                                .action(ArgAction::SetTrue)
                                .help("Exclude from aggregate balance totals"),
                        ),
                )
                .subcommand(Command::new("list"))
                .subcommand(Command::new("rm").arg(Arg::new("name").long("name").required(true)))
                .subcommand(
                    Command::new("set-group")
                        .arg(Arg::new("name").long("name").required(true))
                        .arg(Arg::new("group").long("group").help("Omit to ungroup")),
                ),
        )
        .subcommand(
            Command::new("category")
                .about("Manage categories")
                .subcommand(Command::new("add").arg(Arg::new("name").long("name").required(true)))
                .subcommand(Command::new("list"))
                .subcommand(Command::new("rm").arg(Arg::new("name").long("name").required(true)))
                .subcommand(
                    Command::new("reorder")
                        .arg(Arg::new("name").long("name").required(true))
                        .arg(
                            Arg::new("position")
                                .long("position")
                                .required(true)
                                .value_parser(value_parser!(i64)),
                        ),
                ),
        )
        .subcommand(
            Command::new("tx")
                .about("Manage transactions")
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("date").long("date").required(true))
                        .arg(Arg::new("account").long("account").required(true))
                        .arg(
                            Arg::new("amount")
                                .long("amount")
                                .required(true)
                                .allow_negative_numbers(true),
                        )
                        .arg(
                            Arg::new("kind")
                                .long("kind")
                                .value_parser(["income", "expense", "neutral"])
                                .help("Defaults to the sign of the amount"),
                        )
                        .arg(Arg::new("category").long("category"))
                        .arg(Arg::new("memo").long("memo"))
                        .arg(
                            Arg::new("exclude")
                                .long("exclude")
                                .action(ArgAction::SetTrue)
                                .help("Exclude from balance computations"),
                        ),
                )
                .subcommand(
                    Command::new("transfer")
                        .arg(Arg::new("date").long("date").required(true))
                        .arg(Arg::new("from").long("from").required(true))
                        .arg(Arg::new("to").long("to").required(true))
                        .arg(Arg::new("amount").long("amount").required(true))
                        .arg(Arg::new("memo").long("memo")),
                )
                .subcommand(
                    Command::new("edit")
                        .arg(Arg::new("uuid").long("uuid").required(true))
                        .arg(Arg::new("date").long("date"))
                        .arg(Arg::new("amount").long("amount").allow_negative_numbers(true))
                        .arg(Arg::new("kind").long("kind").value_parser([
                            "income", "expense", "neutral",
                        ]))
                        .arg(Arg::new("category").long("category"))
                        .arg(Arg::new("memo").long("memo"))
                        .arg(
                            Arg::new("exclude")
                                .long("exclude")
                                .value_parser(value_parser!(bool)),
                        ),
                )
                .subcommand(Command::new("rm").arg(Arg::new("uuid").long("uuid").required(true)))
                .subcommand(json_flags(
                    Command::new("list")
                        .arg(Arg::new("month").long("month"))
                        .arg(Arg::new("account").long("account"))
                        .arg(Arg::new("category").long("category"))
                        .arg(
                            Arg::new("limit")
                                .long("limit")
                                .value_parser(value_parser!(usize)),
                        ),
                )),
        )
        .subcommand(
            Command::new("import").about("Import bank CSV exports").subcommand(
                json_flags(
                    Command::new("transactions")
                        .arg(Arg::new("path").long("path").required(true))
                        .arg(Arg::new("account").long("account").required(true))
                        .arg(
                            Arg::new("accept_suspicious")
                                .long("accept-suspicious")
                                .action(ArgAction::SetTrue)
                                .help("Import near-duplicates instead of holding them"),
                        ),
                ),
            ),
        )
        .subcommand(
            Command::new("export").about("Export data").subcommand(
                Command::new("transactions").arg(Arg::new("out").long("out").required(true)),
            ),
        )
        .subcommand(
            Command::new("report")
                .about("Financial evaluation")
                .subcommand(json_flags(Command::new("balances")))
                .subcommand(json_flags(Command::new("monthly").arg(
                    Arg::new("months").long("months").value_parser(value_parser!(usize)),
                )))
                .subcommand(json_flags(
                    Command::new("by-category")
                        .arg(Arg::new("month").long("month").required(true)),
                )),
        )
        .subcommand(
            Command::new("backup")
                .about("Local snapshot files")
                .subcommand(Command::new("save").arg(Arg::new("out").long("out").required(true)))
                .subcommand(Command::new("load").arg(Arg::new("path").long("path").required(true)))
                .subcommand(Command::new("hash")),
        )
        .subcommand(
            Command::new("sync")
                .about("WebDAV backup synchronization")
                .subcommand(
                    Command::new("setup")
                        .arg(Arg::new("url").long("url").required(true))
                        .arg(Arg::new("user").long("user").required(true))
                        .arg(Arg::new("password").long("password").required(true))
                        .arg(
                            Arg::new("auto")
                                .long("auto")
                                .value_parser(value_parser!(bool))
                                .default_value("true"),
                        )
                        .arg(Arg::new("device_name").long("device-name")),
                )
                .subcommand(Command::new("run"))
                .subcommand(
                    Command::new("watch").arg(
                        Arg::new("interval")
                            .long("interval")
                            .value_parser(value_parser!(u64))
                            .default_value("60")
                            .help("Seconds between automatic attempts"),
                    ),
                )
                .subcommand(Command::new("status")),
        )
        .subcommand(
            Command::new("rules")
                .about("Category matcher rules")
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("pattern").long("pattern").required(true))
                        .arg(Arg::new("category").long("category").required(true)),
                )
                .subcommand(Command::new("list"))
                .subcommand(
                    Command::new("teach")
                        .arg(Arg::new("original").long("original").required(true))
                        .arg(Arg::new("short").long("short").required(true))
                        .arg(Arg::new("category").long("category").required(true)),
                )
                .subcommand(Command::new("rm").arg(Arg::new("id").long("id").required(true))),
        )
        .subcommand(Command::new("doctor").about("Integrity checks"))
}
