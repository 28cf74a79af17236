// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Descriptor files on disk drive the workflows.

mod common;

use std::io::Write;
use std::sync::Arc;

use common::*;
use wordlink_sdk::{Category, LinkConfig, RobotLink, SdkError, Transport, VariableIndex};

fn descriptor_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_from_config_path() {
    let file = descriptor_file(
        "// relocated firmware\n\
         #define ID_COM 101\n\
         #define MOVE_TO_HOME 104\n\
         #define EXTRA_FLAG 200 // not in the catalogue\n\
         garbage line\n",
    );
    let config = LinkConfig::new().with_descriptor_path(file.path());

    let index = VariableIndex::from_config(&config).unwrap();

    assert_eq!(index.len(), 3);
    assert_eq!(index.resolve("ID_COM").unwrap().address, 101);
    assert_eq!(index.resolve("EXTRA_FLAG").unwrap().category, Category::System);
    assert_eq!(index.lookup_or_default("MUESCAS_MATRIX_XY", 31), 31);
}

#[test]
fn test_missing_descriptor_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = LinkConfig::new().with_descriptor_path(dir.path().join("words_idx.h"));

    let err = VariableIndex::from_config(&config).unwrap_err();
    assert!(matches!(err, SdkError::Descriptor { .. }));
}

#[tokio::test]
async fn test_workflow_uses_relocated_addresses() {
    let file = descriptor_file("ID_COM 1\nMOVE_TO_HOME 104\n");
    let variables = VariableIndex::load(file.path()).unwrap();
    let controller = SimulatedController::new();
    controller.script(&["$HOME done!"]);
    let transport: Arc<dyn Transport> = controller.clone();
    let link = RobotLink::new(test_config(), transport, Arc::new(variables));

    let result = link.move_to_home().await;

    assert!(result.is_success());
    assert!(controller.dispatched()[0].contains("$WORD[104]:=1<ENTER>"));
}
