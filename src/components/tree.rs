use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Widget},
};

use workspace_tree::tree::Node;

/// One on-screen row: a visible node plus the flags it is drawn with.
#[derive(Debug, Clone, Copy)]
pub struct TreeRow<'a> {
    pub node: &'a Node,
    pub expanded: bool,
    pub loading: bool,
    pub selected: bool,
}

/// Renders the rows of the current viewport. Callers slice the visible
/// list before building rows, so the widget cost is bounded by the screen.
pub struct TreeWidget<'a> {
    rows: &'a [TreeRow<'a>],
    use_icons: bool,
    block: Option<Block<'a>>,
}

impl<'a> TreeWidget<'a> {
    pub fn new(rows: &'a [TreeRow<'a>], use_icons: bool) -> Self {
        Self {
            rows,
            use_icons,
            block: None,
        }
    }

    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = Some(block);
        self
    }

    fn marker(&self, row: &TreeRow<'_>) -> &'static str {
        match (row.node.is_dir(), self.use_icons) {
            (true, _) if row.loading => "… ",
            (true, _) if row.expanded => "▾ ",
            (true, _) => "▸ ",
            (false, true) => file_icon(&row.node.name),
            (false, false) => "  ",
        }
    }

    fn style(row: &TreeRow<'_>) -> Style {
        if row.selected {
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD)
        } else if row.node.is_hidden() {
            Style::default().fg(Color::DarkGray)
        } else if row.node.is_dir() {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        }
    }
}

/// Nerd Font glyph for a handful of common extensions.
fn file_icon(name: &str) -> &'static str {
    let ext = name.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "rs" => " ",
        "ts" | "tsx" | "js" | "jsx" => " ",
        "json" | "toml" | "yaml" | "yml" => " ",
        "md" | "txt" => " ",
        "lock" => " ",
        _ => " ",
    }
}

impl<'a> Widget for TreeWidget<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let inner = match &self.block {
            Some(block) => {
                let inner = block.inner(area);
                block.clone().render(area, buf);
                inner
            }
            None => area,
        };

        for (i, row) in self.rows.iter().take(inner.height as usize).enumerate() {
            let y = inner.y + i as u16;
            let indent = "  ".repeat(row.node.depth);
            let text = format!("{}{}{}", indent, self.marker(row), row.node.name);
            let line = Line::from(Span::styled(text, Self::style(row)));
            buf.set_line(inner.x, y, &line, inner.width);
        }
    }
}
