use owo_colors::Style;

// Stylesheet used to colorize prints.
#[derive(Debug, Default)]
pub(crate) struct Styles {
    pub stage_style: Style,
    pub tensor_style: Style,
    pub warning_style: Style,
}

impl Styles {
    pub(crate) fn colorize(&mut self) {
        self.stage_style = Style::new().bright_blue();
        self.tensor_style = Style::new().bright_green();
        self.warning_style = Style::new().bright_yellow();
    }
}
