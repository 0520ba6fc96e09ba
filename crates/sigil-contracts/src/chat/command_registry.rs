#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// Commands whose whole remainder is one free-text value.
pub(crate) const TEXT_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "brand",
        action: "set_brand",
    },
    CommandSpec {
        command: "tagline",
        action: "set_tagline",
    },
    CommandSpec {
        command: "description",
        action: "set_description",
    },
    CommandSpec {
        command: "colors",
        action: "set_colors",
    },
    CommandSpec {
        command: "style",
        action: "set_style",
    },
    CommandSpec {
        command: "count",
        action: "set_count",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "reference",
    action: "set_reference",
}];

pub(crate) const ARTIFACT_ID_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "remix",
        action: "remix",
    },
    CommandSpec {
        command: "select",
        action: "select",
    },
    CommandSpec {
        command: "lineage",
        action: "lineage",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "generate",
        action: "generate",
    },
    CommandSpec {
        command: "clear_reference",
        action: "clear_reference",
    },
    CommandSpec {
        command: "history",
        action: "history",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "styles",
        action: "styles",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
];

pub(crate) const EXPORT_COMMAND: CommandSpec = CommandSpec {
    command: "export",
    action: "export",
};

pub const STUDIO_HELP_COMMANDS: &[&str] = &[
    "/brand",
    "/tagline",
    "/description",
    "/style",
    "/colors",
    "/count",
    "/reference",
    "/clear_reference",
    "/generate",
    "/remix",
    "/select",
    "/history",
    "/lineage",
    "/export",
    "/status",
    "/styles",
    "/help",
    "/quit",
];
