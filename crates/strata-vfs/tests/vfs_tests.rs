use std::fs;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use strata_core::{EntryType, ListError, VfsConfig};
use strata_list::{AbortOnError, ListSource, ListedEntry, Lister, copy_tree, create_writer};
use strata_task::BackgroundPool;
use strata_vfs::{Backend, Delegate, DirEntry, DirType, Dispatcher, ListerProvider, Vfs};
use tempfile::TempDir;

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
    done: AtomicBool,
}

impl Recorder {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    fn finish_count(&self) -> usize {
        self.events().iter().filter(|e| e.starts_with("finish")).count()
    }
}

impl Delegate for Recorder {
    fn begin(&self) {
        self.events.lock().unwrap().push("begin".into());
    }

    fn new_entry(&self, entry: &DirEntry) {
        self.events.lock().unwrap().push(format!("entry {}", entry.file_name));
    }

    fn finish(&self, cancelled: bool, error: Option<&ListError>) {
        self.events
            .lock()
            .unwrap()
            .push(format!("finish {cancelled} {:?}", error.map(ListError::code)));
        self.done.store(true, Ordering::SeqCst);
    }
}

fn config() -> VfsConfig {
    VfsConfig::builder().monitor(false).threads(2usize).build().unwrap()
}

async fn drive(dispatcher: &mut Dispatcher, recorder: &Recorder) {
    tokio::time::timeout(Duration::from_secs(10), dispatcher.run_until(|| recorder.is_done()))
        .await
        .expect("operation did not finish");
}

async fn wait_for(recorder: &Recorder, event: &str) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !recorder.events().iter().any(|e| e == event) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("event never arrived");
}

fn pack(source: &Path, output: &Path) {
    fs::create_dir_all(source.join("docs/api")).unwrap();
    fs::write(source.join("docs/api/index.html"), "<html>").unwrap();
    fs::write(source.join("docs/guide.md"), "guide").unwrap();
    fs::write(source.join("README.md"), "readme").unwrap();

    let mut writer = create_writer(output).unwrap();
    copy_tree(source, writer.as_mut(), &mut AbortOnError).unwrap();
    writer.close().unwrap();
}

/// Hands out entries one at a time as the test opens the gate.
struct GatedLister {
    gate: Mutex<mpsc::Receiver<()>>,
}

impl Lister for GatedLister {
    fn list(
        &self,
        _source: ListSource,
        visit: &mut dyn FnMut(ListedEntry) -> ControlFlow<()>,
    ) -> Result<(), ListError> {
        let gate = self.gate.lock().unwrap();
        for i in 0..3 {
            if gate.recv().is_err() {
                break;
            }
            if visit(ListedEntry::new(format!("f{i}"), EntryType::Regular)).is_break() {
                break;
            }
        }
        Ok(())
    }
}

struct Gated(Arc<GatedLister>);

impl ListerProvider for Gated {
    fn lister(&self, _dir_type: &DirType) -> Arc<dyn Lister> {
        self.0.clone()
    }
}

#[tokio::test]
async fn test_read_directory() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.txt"), "a").unwrap();
    fs::create_dir(temp.path().join("sub")).unwrap();

    let (mut dispatcher, handle) = Dispatcher::new();
    let vfs = Vfs::new(config(), handle).unwrap();
    let recorder = Arc::new(Recorder::default());
    vfs.read(temp.path(), recorder.clone());
    drive(&mut dispatcher, &recorder).await;

    let events = recorder.events();
    assert_eq!(events.first().map(String::as_str), Some("begin"));
    assert_eq!(events.last().map(String::as_str), Some("finish false None"));
    assert_eq!(events.len(), 4);

    let dir_type = vfs.dir_type().unwrap();
    assert_eq!(dir_type.backend, Backend::Directory);
    assert_eq!(vfs.current_path().unwrap(), temp.path());
    assert_eq!(vfs.visible_entries().len(), 2);
    assert!(!vfs.is_busy());
}

#[tokio::test]
async fn test_read_missing_reports_error() {
    let temp = TempDir::new().unwrap();
    let (mut dispatcher, handle) = Dispatcher::new();
    let vfs = Vfs::new(config(), handle).unwrap();

    let recorder = Arc::new(Recorder::default());
    vfs.read(temp.path().join("missing"), recorder.clone());
    drive(&mut dispatcher, &recorder).await;

    assert_eq!(recorder.events().last().unwrap(), "finish false Some(2)");
    assert!(vfs.dir_type().is_none());
    assert!(vfs.current_tree().is_empty());
}

#[tokio::test]
async fn test_cancelled_read_leaves_state_untouched() {
    let temp = TempDir::new().unwrap();
    let (gate_tx, gate_rx) = mpsc::channel();
    let listers = Arc::new(Gated(Arc::new(GatedLister {
        gate: Mutex::new(gate_rx),
    })));

    let (mut dispatcher, handle) = Dispatcher::new();
    let vfs = Vfs::with_listers(config(), BackgroundPool::new(2).unwrap(), handle, listers);
    assert!(!vfs.cancel());

    let recorder = Arc::new(Recorder::default());
    vfs.read(temp.path(), recorder.clone());
    gate_tx.send(()).unwrap();
    wait_for(&recorder, "entry f0").await;

    assert!(vfs.cancel());
    gate_tx.send(()).unwrap();
    drop(gate_tx);
    drive(&mut dispatcher, &recorder).await;

    assert_eq!(recorder.events(), vec!["begin", "entry f0", "finish true None"]);
    assert_eq!(recorder.finish_count(), 1);
    assert!(vfs.dir_type().is_none());
    assert!(vfs.current_tree().is_empty());
    assert!(!vfs.is_busy());
}

#[tokio::test]
async fn test_ascend_at_base_is_refused() {
    let temp = TempDir::new().unwrap();
    let (mut dispatcher, handle) = Dispatcher::new();
    let vfs = Vfs::new(config(), handle).unwrap();

    let never = Arc::new(Recorder::default());
    assert!(!vfs.ascend(never.clone()));

    let recorder = Arc::new(Recorder::default());
    vfs.read(temp.path(), recorder.clone());
    drive(&mut dispatcher, &recorder).await;

    let before = vfs.current_tree();
    assert!(!vfs.ascend(never.clone()));
    assert_eq!(vfs.current_tree(), before);
    assert_eq!(vfs.current_path().unwrap(), temp.path());
    assert!(never.events().is_empty());
}

#[tokio::test]
async fn test_archive_navigation() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("bundle.tar.gz");
    pack(&temp.path().join("source"), &archive);

    let (mut dispatcher, handle) = Dispatcher::new();
    let vfs = Vfs::new(config(), handle).unwrap();

    let recorder = Arc::new(Recorder::default());
    vfs.read(&archive, recorder.clone());
    drive(&mut dispatcher, &recorder).await;
    assert_eq!(recorder.events(), vec!["begin", "entry README.md", "entry docs", "finish false None"]);
    assert!(vfs.current_tree().is_archive());

    let docs = vfs
        .visible_entries()
        .into_iter()
        .find(|e| e.file_name.as_str() == "docs")
        .unwrap();
    let into_docs = Arc::new(Recorder::default());
    assert!(vfs.descend(&docs, into_docs.clone()));
    drive(&mut dispatcher, &into_docs).await;
    assert_eq!(into_docs.events(), vec!["begin", "entry api", "entry guide.md", "finish false None"]);
    assert_eq!(vfs.current_path().unwrap(), archive.join("docs"));

    let guide = vfs
        .visible_entries()
        .into_iter()
        .find(|e| e.file_name.as_str() == "guide.md")
        .unwrap();
    assert!(!vfs.descend(&guide, Arc::new(Recorder::default())));

    let up = Arc::new(Recorder::default());
    assert!(vfs.ascend(up.clone()));
    drive(&mut dispatcher, &up).await;
    assert_eq!(vfs.dir_type().unwrap().logical, "");
    assert_eq!(vfs.visible_entries().len(), 2);
}

#[tokio::test]
async fn test_read_inside_archive() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("bundle.zip");
    pack(&temp.path().join("source"), &archive);

    let (mut dispatcher, handle) = Dispatcher::new();
    let vfs = Vfs::new(config(), handle).unwrap();

    let recorder = Arc::new(Recorder::default());
    vfs.read(archive.join("docs/api"), recorder.clone());
    drive(&mut dispatcher, &recorder).await;
    assert_eq!(recorder.events(), vec!["begin", "entry index.html", "finish false None"]);

    let missing = Arc::new(Recorder::default());
    vfs.read(archive.join("nope"), missing.clone());
    drive(&mut dispatcher, &missing).await;
    assert_eq!(missing.events().last().unwrap(), "finish false Some(2)");
    // a failed read keeps the previous location
    assert_eq!(vfs.current_path().unwrap(), archive.join("docs/api"));
}

#[tokio::test]
async fn test_descend_into_directory_and_archive_file() {
    let temp = TempDir::new().unwrap();
    pack(&temp.path().join("source"), &temp.path().join("bundle.tar"));

    let (mut dispatcher, handle) = Dispatcher::new();
    let vfs = Vfs::new(config(), handle).unwrap();
    let recorder = Arc::new(Recorder::default());
    vfs.read(temp.path(), recorder.clone());
    drive(&mut dispatcher, &recorder).await;

    let find = |name: &str| {
        vfs.visible_entries()
            .into_iter()
            .find(|e| e.file_name.as_str() == name)
            .unwrap()
    };

    let into_source = Arc::new(Recorder::default());
    assert!(vfs.descend(&find("source"), into_source.clone()));
    drive(&mut dispatcher, &into_source).await;
    assert_eq!(vfs.current_path().unwrap(), temp.path().join("source"));

    let back = Arc::new(Recorder::default());
    vfs.read(temp.path(), back.clone());
    drive(&mut dispatcher, &back).await;

    let into_archive = Arc::new(Recorder::default());
    assert!(vfs.descend(&find("bundle.tar"), into_archive.clone()));
    drive(&mut dispatcher, &into_archive).await;
    assert_eq!(vfs.dir_type().unwrap().backend, Backend::Archive(strata_list::ArchiveFormat::Tar));
}

#[tokio::test]
async fn test_refresh_moves_up_when_subpath_vanishes() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source");
    let archive = temp.path().join("bundle.tar");
    pack(&source, &archive);

    let (mut dispatcher, handle) = Dispatcher::new();
    let vfs = Vfs::new(config(), handle).unwrap();
    let recorder = Arc::new(Recorder::default());
    vfs.read(archive.join("docs/api"), recorder.clone());
    drive(&mut dispatcher, &recorder).await;

    let deleted = Arc::new(Mutex::new(None));
    let seen = Arc::clone(&deleted);
    vfs.on_deleted(move |path| *seen.lock().unwrap() = Some(path.to_path_buf()));

    // repack without docs/api
    fs::remove_dir_all(source.join("docs/api")).unwrap();
    fs::remove_file(&archive).unwrap();
    let mut writer = create_writer(&archive).unwrap();
    copy_tree(&source, writer.as_mut(), &mut AbortOnError).unwrap();
    writer.close().unwrap();

    let refresh = Arc::new(Recorder::default());
    assert!(vfs.refresh(refresh.clone()));
    drive(&mut dispatcher, &refresh).await;

    assert_eq!(refresh.events(), vec!["begin", "entry guide.md", "finish false None"]);
    assert_eq!(vfs.dir_type().unwrap().logical, "docs");
    assert_eq!(deleted.lock().unwrap().clone(), Some(archive.join("docs")));
}
