//! Translation of raw `notify` events into monitor events.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use notify::Event;
use notify::event::{AccessKind, AccessMode, EventKind, ModifyKind, RenameMode};

use crate::event::MonitorEvent;

/// Stateful translator for one watched object.
///
/// Split renames (a `From` half and a `To` half sharing a tracker) are
/// paired up; a `From` half that never gets its partner becomes a deletion
/// when the burst is flushed.
#[derive(Debug)]
pub(crate) struct Translator {
    root: PathBuf,
    is_directory: bool,
    pending_from: Option<(Option<usize>, String)>,
    paired: HashSet<usize>,
}

impl Translator {
    pub(crate) fn new(root: impl Into<PathBuf>, is_directory: bool) -> Self {
        Self {
            root: root.into(),
            is_directory,
            pending_from: None,
            paired: HashSet::new(),
        }
    }

    pub(crate) fn translate(&mut self, event: Event) -> Vec<MonitorEvent> {
        if self.is_directory {
            self.translate_dir(event)
        } else {
            self.translate_file(event)
        }
    }

    /// Events still held back at the end of a burst.
    /// A rename source is waiting for its destination.
    pub(crate) fn has_pending(&self) -> bool {
        self.pending_from.is_some()
    }

    pub(crate) fn flush(&mut self) -> Vec<MonitorEvent> {
        self.paired.clear();
        self.flush_unpaired()
    }

    /// Name of `path` if it lies directly inside the watched directory.
    fn child_name(&self, path: &Path) -> Option<String> {
        if path.parent()? != self.root.as_path() {
            return None;
        }
        path.file_name().map(|n| n.to_string_lossy().into_owned())
    }

    fn translate_dir(&mut self, event: Event) -> Vec<MonitorEvent> {
        if event.need_rescan() {
            return vec![MonitorEvent::DirModified];
        }

        if event.paths.iter().any(|p| p == &self.root) {
            return match event.kind {
                EventKind::Remove(_) => vec![MonitorEvent::DirDeleted],
                EventKind::Modify(ModifyKind::Name(_)) if !self.root.exists() => {
                    vec![MonitorEvent::DirDeleted]
                }
                EventKind::Access(_) => Vec::new(),
                _ => vec![MonitorEvent::DirModified],
            };
        }

        let tracker = event.attrs.tracker();
        match event.kind {
            EventKind::Create(_) => self.each_child(&event.paths, MonitorEvent::FileCreated),
            EventKind::Remove(_) => self.each_child(&event.paths, MonitorEvent::FileDeleted),
            EventKind::Modify(ModifyKind::Name(mode)) => self.rename(mode, tracker, &event.paths),
            EventKind::Modify(_) => self.each_child(&event.paths, MonitorEvent::FileModified),
            EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
                self.each_child(&event.paths, MonitorEvent::FileModified)
            }
            EventKind::Access(_) | EventKind::Other => Vec::new(),
            EventKind::Any => vec![MonitorEvent::DirModified],
        }
    }

    fn each_child(&self, paths: &[PathBuf], make: fn(String) -> MonitorEvent) -> Vec<MonitorEvent> {
        paths
            .iter()
            .filter_map(|p| self.child_name(p))
            .map(make)
            .collect()
    }

    fn rename(&mut self, mode: RenameMode, tracker: Option<usize>, paths: &[PathBuf]) -> Vec<MonitorEvent> {
        match mode {
            RenameMode::From => {
                let out = self.flush_unpaired();
                if let Some(name) = paths.first().and_then(|p| self.child_name(p)) {
                    self.pending_from = Some((tracker, name));
                }
                out
            }
            RenameMode::To => {
                let Some(to) = paths.first().and_then(|p| self.child_name(p)) else {
                    return self.flush_unpaired();
                };
                match self.pending_from.take() {
                    Some((from_tracker, from)) if from_tracker == tracker => {
                        if let Some(t) = tracker {
                            self.paired.insert(t);
                        }
                        vec![MonitorEvent::FileRenamed { from, to }]
                    }
                    other => {
                        self.pending_from = other;
                        let mut out = self.flush_unpaired();
                        out.push(MonitorEvent::FileCreated(to));
                        out
                    }
                }
            }
            RenameMode::Both => {
                if tracker.is_some_and(|t| self.paired.contains(&t)) {
                    return Vec::new();
                }
                let from = paths.first().and_then(|p| self.child_name(p));
                let to = paths.get(1).and_then(|p| self.child_name(p));
                match (from, to) {
                    (Some(from), Some(to)) => vec![MonitorEvent::FileRenamed { from, to }],
                    (Some(from), None) => vec![MonitorEvent::FileDeleted(from)],
                    (None, Some(to)) => vec![MonitorEvent::FileCreated(to)],
                    (None, None) => Vec::new(),
                }
            }
            RenameMode::Any | RenameMode::Other => paths
                .iter()
                .filter_map(|p| {
                    let name = self.child_name(p)?;
                    Some(if p.symlink_metadata().is_ok() {
                        MonitorEvent::FileCreated(name)
                    } else {
                        MonitorEvent::FileDeleted(name)
                    })
                })
                .collect(),
        }
    }

    fn flush_unpaired(&mut self) -> Vec<MonitorEvent> {
        self.pending_from
            .take()
            .map(|(_, name)| vec![MonitorEvent::FileDeleted(name)])
            .unwrap_or_default()
    }

    /// A file watch only cares about the file itself.
    fn translate_file(&mut self, event: Event) -> Vec<MonitorEvent> {
        if event.need_rescan() {
            return vec![MonitorEvent::DirModified];
        }
        if !event.paths.iter().any(|p| p == &self.root) {
            return Vec::new();
        }

        let gone = match event.kind {
            EventKind::Remove(_) => true,
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => true,
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                event.paths.first() == Some(&self.root)
            }
            EventKind::Modify(ModifyKind::Name(_)) => !self.root.exists(),
            EventKind::Access(AccessKind::Close(AccessMode::Write)) => false,
            EventKind::Access(_) | EventKind::Other => return Vec::new(),
            _ => false,
        };

        if gone {
            vec![MonitorEvent::DirDeleted]
        } else {
            vec![MonitorEvent::DirModified]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, Flag, RemoveKind};

    fn root() -> PathBuf {
        PathBuf::from("/watched")
    }

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |e, p| e.add_path(PathBuf::from(p)))
    }

    #[test]
    fn test_per_file_events() {
        let mut t = Translator::new(root(), true);
        assert_eq!(
            t.translate(event(EventKind::Create(CreateKind::File), &["/watched/a"])),
            [MonitorEvent::FileCreated("a".into())]
        );
        assert_eq!(
            t.translate(event(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                &["/watched/a"]
            )),
            [MonitorEvent::FileModified("a".into())]
        );
        assert_eq!(
            t.translate(event(EventKind::Remove(RemoveKind::File), &["/watched/b"])),
            [MonitorEvent::FileDeleted("b".into())]
        );
        // deeper paths are not ours
        assert!(t
            .translate(event(EventKind::Create(CreateKind::File), &["/watched/sub/x"]))
            .is_empty());
    }

    #[test]
    fn test_watched_dir_itself() {
        let mut t = Translator::new(root(), true);
        assert_eq!(
            t.translate(event(EventKind::Remove(RemoveKind::Folder), &["/watched"])),
            [MonitorEvent::DirDeleted]
        );
        assert_eq!(
            t.translate(event(EventKind::Modify(ModifyKind::Any), &["/watched"])),
            [MonitorEvent::DirModified]
        );
    }

    #[test]
    fn test_rescan_maps_to_dir_modified() {
        let mut t = Translator::new(root(), true);
        let e = Event::new(EventKind::Other).set_flag(Flag::Rescan);
        assert_eq!(t.translate(e), [MonitorEvent::DirModified]);
    }

    #[test]
    fn test_split_rename_is_paired_once() {
        let mut t = Translator::new(root(), true);
        let from = event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/watched/old"])
            .set_tracker(7);
        let to = event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), &["/watched/new"])
            .set_tracker(7);
        let both = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/watched/old", "/watched/new"],
        )
        .set_tracker(7);

        assert!(t.translate(from).is_empty());
        assert_eq!(
            t.translate(to),
            [MonitorEvent::FileRenamed {
                from: "old".into(),
                to: "new".into()
            }]
        );
        assert!(t.translate(both).is_empty());
        assert!(t.flush().is_empty());
    }

    #[test]
    fn test_rename_out_of_dir_becomes_delete_on_flush() {
        let mut t = Translator::new(root(), true);
        let from = event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/watched/gone"])
            .set_tracker(3);
        assert!(t.translate(from).is_empty());
        assert!(t.has_pending());
        assert_eq!(t.flush(), [MonitorEvent::FileDeleted("gone".into())]);
        assert!(!t.has_pending());
    }

    #[test]
    fn test_file_watch_reports_dir_events_only() {
        let mut t = Translator::new("/watched/a.zip", false);
        assert_eq!(
            t.translate(event(
                EventKind::Modify(ModifyKind::Data(DataChange::Any)),
                &["/watched/a.zip"]
            )),
            [MonitorEvent::DirModified]
        );
        assert_eq!(
            t.translate(event(EventKind::Remove(RemoveKind::File), &["/watched/a.zip"])),
            [MonitorEvent::DirDeleted]
        );
        assert!(t
            .translate(event(EventKind::Create(CreateKind::File), &["/watched/other"]))
            .is_empty());
    }
}
