use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use std::time::Duration;
use titration::{Command, ReactionType};

/// Flow change per arrow key press.
pub(crate) const FLOW_STEP: f64 = 0.5;

#[derive(Clone, Debug)]
pub(crate) struct InputEvent {
    pub(crate) key: KeyCode,
    pub(crate) mods: KeyModifiers,
}

/// Experiment parameters the keyboard can nudge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Knob {
    AcidMolarity,
    BaseMolarity,
    AcidVolume,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum UiAction {
    Quit,
    HelpToggle,
    Lab(Command),
    Nudge(Knob, i8),
}

pub(crate) fn collect_input_nonblocking(max_frame_time: Duration) -> anyhow::Result<Vec<InputEvent>> {
    let mut out = Vec::new();

    let timeout = std::cmp::min(Duration::from_millis(1), max_frame_time);
    while event::poll(timeout)? {
        if let Event::Key(k) = event::read()? {
            if k.kind == KeyEventKind::Press || k.kind == KeyEventKind::Repeat {
                out.push(InputEvent {
                    key: k.code,
                    mods: k.modifiers,
                });
                if out.len() >= 32 {
                    break;
                }
            }
        }
    }
    Ok(out)
}

pub(crate) fn map_event_to_action(help_open: bool, ev: InputEvent) -> Option<UiAction> {
    if ev.key == KeyCode::Char('c') && ev.mods.contains(KeyModifiers::CONTROL) {
        return Some(UiAction::Quit);
    }
    if help_open {
        return match ev.key {
            KeyCode::Esc | KeyCode::Char('h') | KeyCode::Char('H') => Some(UiAction::HelpToggle),
            KeyCode::Char('q') | KeyCode::Char('Q') => Some(UiAction::Quit),
            _ => None,
        };
    }

    let lab = |c: Command| Some(UiAction::Lab(c));
    match ev.key {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(UiAction::Quit),
        KeyCode::Char('h') | KeyCode::Char('H') => Some(UiAction::HelpToggle),

        KeyCode::Char(' ') => lab(Command::ToggleValve),
        KeyCode::Up => lab(Command::AdjustFlow(FLOW_STEP)),
        KeyCode::Down => lab(Command::AdjustFlow(-FLOW_STEP)),
        KeyCode::Char('i') | KeyCode::Char('I') => lab(Command::ToggleIndicator),
        KeyCode::Char('m') | KeyCode::Char('M') => lab(Command::ToggleModel),
        KeyCode::Char('r') | KeyCode::Char('R') => lab(Command::Reset),
        KeyCode::Char(ch @ '1'..='4') => {
            let idx = ch as usize - '1' as usize;
            lab(Command::SetReactionType(ReactionType::ALL[idx]))
        }

        KeyCode::Char('a') | KeyCode::Char('A') => Some(UiAction::Nudge(Knob::AcidMolarity, 1)),
        KeyCode::Char('z') | KeyCode::Char('Z') => Some(UiAction::Nudge(Knob::AcidMolarity, -1)),
        KeyCode::Char('b') | KeyCode::Char('B') => Some(UiAction::Nudge(Knob::BaseMolarity, 1)),
        KeyCode::Char('n') | KeyCode::Char('N') => Some(UiAction::Nudge(Knob::BaseMolarity, -1)),
        KeyCode::Char('v') | KeyCode::Char('V') => Some(UiAction::Nudge(Knob::AcidVolume, 1)),
        KeyCode::Char('c') | KeyCode::Char('C') => Some(UiAction::Nudge(Knob::AcidVolume, -1)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> InputEvent {
        InputEvent {
            key: code,
            mods: KeyModifiers::NONE,
        }
    }

    #[test]
    fn number_keys_pick_reactions_in_order() {
        for (i, ch) in ['1', '2', '3', '4'].into_iter().enumerate() {
            assert_eq!(
                map_event_to_action(false, key(KeyCode::Char(ch))),
                Some(UiAction::Lab(Command::SetReactionType(ReactionType::ALL[i])))
            );
        }
        assert_eq!(map_event_to_action(false, key(KeyCode::Char('5'))), None);
    }

    #[test]
    fn help_swallows_lab_keys() {
        assert_eq!(map_event_to_action(true, key(KeyCode::Char(' '))), None);
        assert_eq!(
            map_event_to_action(true, key(KeyCode::Esc)),
            Some(UiAction::HelpToggle)
        );
        assert_eq!(map_event_to_action(false, key(KeyCode::Esc)), Some(UiAction::Quit));
    }

    #[test]
    fn ctrl_c_quits_but_plain_c_shrinks_volume() {
        let ctrl_c = InputEvent {
            key: KeyCode::Char('c'),
            mods: KeyModifiers::CONTROL,
        };
        assert_eq!(map_event_to_action(false, ctrl_c), Some(UiAction::Quit));
        assert_eq!(
            map_event_to_action(false, key(KeyCode::Char('c'))),
            Some(UiAction::Nudge(Knob::AcidVolume, -1))
        );
    }
}
