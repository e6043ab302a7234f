//! UI rendering for the debugger.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, List, ListItem, Wrap},
    style::{Color, Style, Modifier},
};
use crate::cpu::decode_output;
use super::app::DebuggerApp;

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(60),
            Constraint::Percentage(40),
        ])
        .split(frame.area());

    // Left side: code, machine state and status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(7),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_disassembly(frame, left_chunks[0], app);
    draw_registers(frame, left_chunks[1], app);
    draw_status(frame, left_chunks[2], app);

    // Right side: memory, output and help
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(5),
            Constraint::Length(4),
        ])
        .split(chunks[1]);

    draw_memory(frame, right_chunks[0], app);
    draw_output(frame, right_chunks[1], app);
    draw_help(frame, right_chunks[2]);
}

/// Draw the program listing.
fn draw_disassembly(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let disasm = app.get_disassembly((area.height as usize).saturating_sub(2));

    let items: Vec<ListItem> = disasm
        .iter()
        .map(|(addr, instr, is_current)| {
            let prefix = if *is_current { "▶ " } else { "  " };
            let bp = if app.breakpoints.contains(addr) { "●" } else { " " };
            let text = format!("{}{:03}: {}", prefix, addr, instr);

            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if app.breakpoints.contains(addr) {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };

            ListItem::new(format!("{} {}", bp, text)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Program ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)));

    frame.render_widget(list, area);
}

/// Draw registers, latches and the clock.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let dp = app.cu.data_path();

    let mut regs = vec![Span::raw("RG: ")];
    for (i, value) in dp.registers().iter().enumerate() {
        regs.push(Span::raw(format!("r{}=", i + 1)));
        regs.push(Span::styled(format!("{:<6}", value), Style::default().fg(Color::White)));
    }

    let flag_style = if dp.zero() {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::Gray)
    };

    let content = vec![
        Line::from(regs),
        Line::from(vec![
            Span::raw("PC: "),
            Span::styled(format!("{:<5}", app.cu.program_counter()), Style::default().fg(Color::Yellow)),
            Span::raw("DR: "),
            Span::styled(format!("{:<5}", dp.data_address()), Style::default().fg(Color::White)),
            Span::raw("SB: "),
            Span::styled(format!("{:<5}", dp.buffer_register()), Style::default().fg(Color::White)),
            Span::raw("Z: "),
            Span::styled(if dp.zero() { "1" } else { "0" }, flag_style),
        ]),
        Line::from(vec![
            Span::raw("Tick: "),
            Span::styled(format!("{}", app.cu.current_tick()), Style::default().fg(Color::Cyan)),
            Span::raw("   Input left: "),
            Span::styled(format!("{}", dp.pending_input()), Style::default().fg(Color::White)),
            Span::raw("   State: "),
            if app.stopped {
                Span::styled("Stopped", Style::default().fg(Color::Red))
            } else {
                Span::styled("Ready", Style::default().fg(Color::Green))
            },
        ]),
    ];

    let paragraph = Paragraph::new(content)
        .block(Block::default()
            .title(" Machine ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)));

    frame.render_widget(paragraph, area);
}

/// Draw the data memory view.
fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let dp = app.cu.data_path();
    let cells = dp.data_memory();
    let visible_rows = (area.height as usize).saturating_sub(2);
    let start = app.mem_scroll.min(cells.len());
    let end = (start + visible_rows).min(cells.len());

    let items: Vec<ListItem> = cells[start..end]
        .iter()
        .enumerate()
        .map(|(offset, cell)| {
            let addr = start + offset;
            let value = cell.value();
            let is_latched = addr as i64 == dp.data_address();

            let text = format!("{:03}: {:<7} {}", addr, cell.opcode.mnemonic(), value);

            let style = if is_latched {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if value != 0 {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::DarkGray)
            };

            ListItem::new(text).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Data memory ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)));

    frame.render_widget(list, area);
}

/// Draw the output produced so far.
fn draw_output(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let output = decode_output(app.cu.data_path().output());
    let paragraph = Paragraph::new(output)
        .wrap(Wrap { trim: false })
        .block(Block::default()
            .title(" Output ")
            .borders(Borders::ALL));

    frame.render_widget(paragraph, area);
}

/// Draw status bar.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(Block::default()
            .title(" Status ")
            .borders(Borders::ALL));

    frame.render_widget(status, area);
}

/// Draw help panel.
fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("s: Step  r: Run  p: Pause  b: Breakpoint"),
        Line::from("x: Reset  ↑↓: Scroll memory  q: Quit"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default()
        .title(" Help ")
        .borders(Borders::ALL));

    frame.render_widget(help, area);
}
