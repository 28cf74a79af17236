// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Predefined console routines.
//!
//! Routines are typed at menu pace and carry no correlation id; the only
//! feedback is the dispatch acknowledgement.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wordlink_protocol::{Key, KeyAction, KeySequence};

use crate::error::SdkError;

const MENU_SETTLE: Duration = Duration::from_millis(200);
const COMMIT_SETTLE: Duration = Duration::from_millis(500);
const MOTION_SETTLE: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Routine {
    ResetRobot,
    MoveToHome,
    ClearErrors,
    StartProgram,
    StopProgram,
    SetFmiZero,
}

impl Routine {
    pub const ALL: [Routine; 6] = [
        Routine::ResetRobot,
        Routine::MoveToHome,
        Routine::ClearErrors,
        Routine::StartProgram,
        Routine::StopProgram,
        Routine::SetFmiZero,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Routine::ResetRobot => "reset_robot",
            Routine::MoveToHome => "move_to_home",
            Routine::ClearErrors => "clear_errors",
            Routine::StartProgram => "start_program",
            Routine::StopProgram => "stop_program",
            Routine::SetFmiZero => "set_fmi_zero",
        }
    }

    /// The keystrokes this routine types.
    pub fn sequence(&self) -> KeySequence {
        match self {
            Routine::ResetRobot => KeySequence::starting_with(fmi_zero())
                .then(KeyAction::press(Key::Enter, MENU_SETTLE))
                .then(KeyAction::press(Key::Enter, MENU_SETTLE))
                .then(KeyAction::press(Key::Enter, COMMIT_SETTLE)),
            Routine::MoveToHome => {
                KeySequence::starting_with(KeyAction::type_text("HOME", MENU_SETTLE))
                    .then(KeyAction::press(Key::Enter, MOTION_SETTLE))
            }
            Routine::ClearErrors => {
                KeySequence::starting_with(KeyAction::press(Key::Esc, MENU_SETTLE))
                    .then(KeyAction::press(Key::Enter, COMMIT_SETTLE))
            }
            Routine::StartProgram => {
                KeySequence::starting_with(KeyAction::press(Key::F1, MOTION_SETTLE))
            }
            Routine::StopProgram => {
                KeySequence::starting_with(KeyAction::press(Key::Esc, COMMIT_SETTLE))
            }
            Routine::SetFmiZero => KeySequence::starting_with(fmi_zero())
                .then(KeyAction::press(Key::Enter, MENU_SETTLE)),
        }
    }
}

fn fmi_zero() -> KeyAction {
    KeyAction::type_text("$FMI[1]:=0", MENU_SETTLE)
}

impl fmt::Display for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Routine {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Routine::ALL
            .into_iter()
            .find(|routine| routine.as_str() == s)
            .ok_or_else(|| SdkError::UnknownRoutine(s.to_string()))
    }
}
