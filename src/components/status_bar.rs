use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Widget,
};

const KEY_HINTS: &str = " ⏎:open  h:up  r:refresh  R:reload  w:watch  q:quit ";

/// Bottom line: the selected path, or a transient status message.
pub struct StatusBarWidget<'a> {
    path_str: &'a str,
    status_message: Option<&'a str>,
    watcher_active: bool,
}

impl<'a> StatusBarWidget<'a> {
    pub fn new(path_str: &'a str, watcher_active: bool) -> Self {
        Self {
            path_str,
            status_message: None,
            watcher_active,
        }
    }

    pub fn status_message(mut self, msg: &'a str) -> Self {
        self.status_message = Some(msg);
        self
    }
}

impl<'a> Widget for StatusBarWidget<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 || area.width == 0 {
            return;
        }

        if let Some(msg) = self.status_message {
            let style = if msg.starts_with('⚠') {
                Style::default().bg(Color::Red).fg(Color::White)
            } else {
                Style::default().fg(Color::Green)
            };
            let line = Line::from(Span::styled(msg.to_string(), style));
            buf.set_line(area.x, area.y, &line, area.width);
            return;
        }

        let watcher = if self.watcher_active { "" } else { " [paused]" };
        let spans = vec![
            Span::styled(self.path_str.to_string(), Style::default().fg(Color::White)),
            Span::styled(
                watcher,
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ),
        ];
        buf.set_line(area.x, area.y, &Line::from(spans), area.width);

        // Hints are right-aligned and only drawn when they fit.
        let hints_width = KEY_HINTS.chars().count() as u16;
        let used = (self.path_str.chars().count() + watcher.len()) as u16;
        if used + hints_width <= area.width {
            let hints = Span::styled(
                KEY_HINTS,
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::DIM),
            );
            buf.set_span(area.x + area.width - hints_width, area.y, &hints, hints_width);
        }
    }
}
