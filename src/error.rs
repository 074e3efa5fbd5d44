// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types

use std::fmt;

/// ECS error type
///
/// Most byte-level World operations follow a silent-no-op contract for
/// invalid entities and unknown components; this enum covers the operations
/// that do report failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// Entity not found (stale or unknown handle)
    EntityNotFound,

    /// Component id was never registered
    UnknownComponent,

    /// Attempted to read data from a zero-sized tag component
    TagDataAccess,

    /// AddChild would have created a cycle
    CycleAttempted,

    /// Hierarchy operation error (self-attach, missing relation, etc.)
    HierarchyError(String),

    /// System dependency cycle detected
    SystemCycleDetected,

    /// Schedule error (unknown stage, unknown label)
    ScheduleError(String),

    /// Event type was never registered
    UnknownEventType,

    /// Command buffer error
    CommandError(String),

    /// State machine not found
    UnknownState(String),
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::EntityNotFound => write!(f, "Entity not found"),
            EcsError::UnknownComponent => write!(f, "Component not registered"),
            EcsError::TagDataAccess => write!(f, "Tag components carry no data"),
            EcsError::CycleAttempted => write!(f, "Hierarchy cycle refused"),
            EcsError::HierarchyError(msg) => write!(f, "Hierarchy error: {msg}"),
            EcsError::SystemCycleDetected => write!(f, "System dependency cycle detected"),
            EcsError::ScheduleError(msg) => write!(f, "Schedule error: {msg}"),
            EcsError::UnknownEventType => write!(f, "Event type not registered"),
            EcsError::CommandError(msg) => write!(f, "Command error: {msg}"),
            EcsError::UnknownState(name) => write!(f, "State machine not found: {name}"),
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;
