//! Debugger application state and logic.

use crate::asm::format_instruction;
use crate::cpu::{ControlUnit, DataPath, DataPathError, StepOutcome};
use crate::isa::ProgramImage;
use std::collections::HashSet;

/// Registers available to programs run under the debugger.
const REGISTERS: usize = 4;

/// Debugger application state.
pub struct DebuggerApp {
    /// The machine being debugged.
    pub cu: ControlUnit,
    /// Original image for resets.
    pub image: ProgramImage,
    /// Original input for resets.
    pub input: Vec<char>,
    /// Breakpoints (by instruction index).
    pub breakpoints: HashSet<usize>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Has the machine stopped (halt, end of input or error)?
    pub stopped: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Memory view scroll offset.
    pub mem_scroll: usize,
}

impl DebuggerApp {
    /// Create a new debugger with a loaded image.
    pub fn new(image: ProgramImage, input: Vec<char>) -> Result<Self, DataPathError> {
        let cu = build_machine(&image, &input)?;
        Ok(Self {
            cu,
            image,
            input,
            breakpoints: HashSet::new(),
            running: false,
            stopped: false,
            should_quit: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            mem_scroll: 0,
        })
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if self.stopped {
            self.status = format!("Machine stopped at tick {}", self.cu.current_tick());
            self.running = false;
            return;
        }

        let pc = self.cu.program_counter();
        let text = self.cu.current_instruction().map(format_instruction).unwrap_or_default();
        match self.cu.step() {
            Ok(StepOutcome::Executed(_)) => {
                self.status = format!("PC={:03}: {}  (tick {})", pc, text, self.cu.current_tick());
            }
            Ok(StepOutcome::Halted) => {
                self.stopped = true;
                self.running = false;
                self.status = format!("Halted after {} ticks", self.cu.current_tick());
            }
            Err(e) if e.is_end_of_input() => {
                self.stopped = true;
                self.running = false;
                self.status = format!("Input exhausted at tick {}", self.cu.current_tick());
            }
            Err(e) => {
                self.stopped = true;
                self.running = false;
                self.status = format!("Error: {}", e);
            }
        }
    }

    /// Run until halt, breakpoint, or error.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();
        // Leave the breakpoint we are sitting on.
        if self.breakpoints.contains(&self.cu.program_counter()) {
            self.step();
        }
    }

    /// Run one iteration of continuous execution.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        let pc = self.cu.program_counter();
        if self.breakpoints.contains(&pc) {
            self.running = false;
            self.status = format!("Breakpoint at PC={}", pc);
            return;
        }

        self.step();
    }

    /// Toggle breakpoint at current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.cu.program_counter();
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at PC={}", pc);
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at PC={}", pc);
        }
    }

    /// Reset the machine to its initial state.
    pub fn reset(&mut self) {
        match build_machine(&self.image, &self.input) {
            Ok(cu) => {
                self.cu = cu;
                self.stopped = false;
                self.status = "Reset. Ready.".into();
            }
            Err(e) => self.status = format!("Error: {}", e),
        }
        self.running = false;
    }

    /// Get the program listing around the current PC.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(usize, String, bool)> {
        let pc = self.cu.program_counter();
        let program = self.cu.program();
        let start = pc.saturating_sub(lines / 2);

        program
            .iter()
            .enumerate()
            .skip(start)
            .take(lines)
            .map(|(addr, word)| (addr, format_instruction(word), addr == pc))
            .collect()
    }
}

fn build_machine(image: &ProgramImage, input: &[char]) -> Result<ControlUnit, DataPathError> {
    let data_path = DataPath::new(image.data.clone(), REGISTERS, input.iter().copied())?;
    Ok(ControlUnit::new(image.code.clone(), data_path))
}

/// Run the debugger with an image and input queue.
pub fn run_debugger(image: ProgramImage, input: Vec<char>) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    let mut app = DebuggerApp::new(image, input)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Main loop
    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Up => {
                            app.mem_scroll = app.mem_scroll.saturating_sub(1);
                        }
                        KeyCode::Down => {
                            if app.mem_scroll + 1 < app.cu.data_path().data_memory().len() {
                                app.mem_scroll += 1;
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
