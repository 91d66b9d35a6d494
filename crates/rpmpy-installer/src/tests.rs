use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use rpmpy_core::testing::{failed, ok, ScriptedRunner};
use rpmpy_core::{ArchiveType, CommandRunner, Logger, Version, VersionInfo, OUTPUT_FILE_NAME};
use rpmpy_source::{FetchOutcome, SourceTransport};
use serial_test::serial;

use super::*;

const SYSTEM_RPM: &str = "/usr/bin/rpm";
const VENV_PYTHON: &str = "/opt/venv/bin/python3";

const SETUP_PY_IN: &str = r#"#!/usr/bin/env python

from distutils.core import setup, Extension
import subprocess
from glob import glob

def pkgconfig(what):
    out = []
    cmd = 'pkg-config %s %s' % (what, '@PACKAGE_NAME@')
    pcout = subprocess.check_output(cmd.split()).decode()
    for token in pcout.split():
        out.append(token[2:])
    return out

rpmmod = Extension('rpm._rpm',
                   sources = glob('*.c'),
                   include_dirs = pkgconfig('--cflags'),
                   library_dirs = pkgconfig('--libs-only-L'),
                   libraries = pkgconfig('--libs-only-l'),
                  )

setup(name='@PACKAGE_NAME@',
      version='@VERSION@',
      maintainer_email='@PACKAGE_BUGREPORT@',
      packages = ['@PACKAGE_NAME@'],
      ext_modules= [rpmmod]
     )
"#;

fn test_dir(label: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "rpmpy-installer-{label}-{}-{nanos}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).expect("must create test dir");
    dir
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("must create parent dir");
    }
    fs::write(path, content).expect("must write file");
}

fn version(raw: &str) -> Version {
    Version::parse(raw).expect("version must parse")
}

fn fedora() -> PackageManager {
    PackageManager::Fedora(FedoraBackend::new(SYSTEM_RPM, FedoraTool::Dnf, "x86_64"))
}

fn venv_python(root: &Path, raw_version: &str) -> Python {
    Python::new(
        VENV_PYTHON,
        VersionInfo::parse(raw_version),
        root.join("site-packages"),
    )
}

fn context<'a>(
    rpm: &'a Rpm,
    python: &'a Python,
    package_manager: &'a PackageManager,
    runner: &'a dyn CommandRunner,
    logger: &'a Logger,
    work_dir: &Path,
) -> InstallerContext<'a> {
    InstallerContext {
        version: rpm.version().clone(),
        rpm,
        python,
        package_manager,
        runner,
        logger,
        work_dir: work_dir.to_path_buf(),
    }
}

fn create_libraries(dir: &Path, names: &[&str]) {
    for name in names {
        write_file(&dir.join(format!("lib{name}.so.8")), "elf");
    }
}

/// Source tree as a shallow clone of rpm leaves it.
fn write_source_tree(top_dir: &Path, popt_in_rpmlib: bool) {
    write_file(&top_dir.join("python").join("setup.py.in"), SETUP_PY_IN);
    write_file(&top_dir.join("rpmio").join("rpmio.h"), "/* rpmio */\n");
    let rpmlib = if popt_in_rpmlib {
        "#include <popt.h>\n#include <rpm/rpmtypes.h>\n"
    } else {
        "#include <rpm/rpmtypes.h>\n"
    };
    write_file(&top_dir.join("lib").join("rpmlib.h"), rpmlib);
    write_file(&top_dir.join("build").join("rpmbuild.h"), "/* build */\n");
    write_file(&top_dir.join("sign").join("rpmsign.h"), "/* sign */\n");
}

/// Transport with no archives published and one clonable branch.
struct GitOnlyTransport {
    branch: String,
    popt_in_rpmlib: bool,
    cloned: RefCell<Vec<String>>,
}

impl GitOnlyTransport {
    fn new(branch: &str) -> Self {
        Self {
            branch: branch.to_string(),
            popt_in_rpmlib: false,
            cloned: RefCell::new(Vec::new()),
        }
    }
}

impl SourceTransport for GitOnlyTransport {
    fn fetch(&self, _url: &str, _destination: &Path) -> anyhow::Result<FetchOutcome> {
        Ok(FetchOutcome::NotFound)
    }

    fn extract(
        &self,
        archive: &Path,
        _archive_type: ArchiveType,
        _destination: &Path,
    ) -> anyhow::Result<()> {
        Err(anyhow!("unexpected extract of {}", archive.display()))
    }

    fn remote_branch_exists(&self, _repository: &str, branch: &str) -> anyhow::Result<bool> {
        Ok(branch == self.branch)
    }

    fn clone_branch(
        &self,
        _repository: &str,
        branch: &str,
        destination: &Path,
    ) -> anyhow::Result<()> {
        self.cloned.borrow_mut().push(branch.to_string());
        if branch != self.branch {
            return Err(anyhow!(
                "fatal: Remote branch {branch} not found in upstream origin."
            ));
        }
        write_source_tree(destination, self.popt_in_rpmlib);
        Ok(())
    }
}

/// Fedora host with everything installed except rpm-devel, librpm in
/// `lib_dir`, and a Python that builds successfully.
fn fedora_runner(lib_dir: &Path) -> ScriptedRunner {
    let runner = ScriptedRunner::new();
    runner
        .on("/usr/bin/rpm --query", ok(""))
        .on("/usr/bin/rpm --query rpm-devel --quiet", failed(1, "", ""))
        .on(
            "/usr/bin/rpm -ql rpm-libs",
            ok(&format!(
                "/usr/lib/.build-id\n{}/librpm.so.8\n{}/librpmio.so.8\n",
                lib_dir.display(),
                lib_dir.display()
            )),
        )
        .on(&format!("{VENV_PYTHON} setup.py -q build"), ok(""))
        .on(&format!("{VENV_PYTHON} setup.py -q install"), ok(""));
    runner
}

/// Fake `rpm2cpio`/`cpio`: a fake package file lists the payload paths it
/// carries, one per line, and extraction creates each of them.
fn script_rpm_extraction(runner: &ScriptedRunner) {
    runner
        .on_with("sh -c rpm2cpio", |command| {
            let args = command.get_args().map(PathBuf::from).collect::<Vec<_>>();
            fs::copy(&args[3], &args[4]).expect("must write payload");
            ok("")
        })
        .on_with("sh -c cpio", |command| {
            let dir = command.get_current_dir().expect("cpio runs in dest dir");
            let payload = command.get_args().nth(3).expect("payload argument");
            let listing = fs::read_to_string(payload).expect("must read payload");
            for entry in listing.lines().filter(|entry| !entry.is_empty()) {
                write_file(&dir.join(entry), "elf");
            }
            ok("")
        });
}

/// `dnf download NAME.x86_64` leaving `file_name` with the given payload.
fn script_dnf_download(
    runner: &ScriptedRunner,
    name: &str,
    file_name: &str,
    payload: Vec<String>,
) {
    let file_name = file_name.to_string();
    runner.on_with(&format!("dnf download {name}.x86_64"), move |command| {
        let dir = command.get_current_dir().expect("download runs in dest dir");
        write_file(&dir.join(&file_name), &payload.join("\n"));
        ok("")
    });
}

/// Payload path of a file below an absolute system directory.
fn payload_entry(system_dir: &Path, file_name: &str) -> String {
    system_dir
        .join(file_name)
        .to_string_lossy()
        .trim_start_matches('/')
        .to_string()
}

#[test]
fn install_state_names_and_terminality() {
    assert_eq!(InstallState::DescriptorPatched.to_string(), "descriptor-patched");
    assert_eq!(
        InstallState::InstalledFromBinaryPackage.as_str(),
        "installed-from-binary-package"
    );
    assert!(InstallState::Skipped.is_terminal());
    assert!(InstallState::Failed.is_terminal());
    assert!(!InstallState::Built.is_terminal());
    assert!(!InstallState::Start.is_terminal());
}

#[test]
fn rpm_probe_reads_third_field_of_version_output() {
    let runner = ScriptedRunner::new();
    runner.on("/usr/bin/rpm --version", ok("RPM version 4.14.2\n"));

    let rpm = Rpm::probe(&runner, Path::new(SYSTEM_RPM)).expect("must probe rpm");
    assert_eq!(rpm.version().as_str(), "4.14.2");
    assert!(rpm.is_system());
    assert!(!Rpm::new("/home/user/rpm/bin/rpm", version("4.14.2")).is_system());
}

#[test]
fn rpm_probe_rejects_short_version_output() {
    let runner = ScriptedRunner::new();
    runner.on("/usr/bin/rpm --version", ok("RPM\n"));

    let err = Rpm::probe(&runner, Path::new(SYSTEM_RPM)).expect_err("must reject output");
    assert!(err.to_string().contains("unexpected rpm --version output"));
}

#[test]
fn rpm_query_arch_rejects_unexpanded_macro() {
    let runner = ScriptedRunner::new();
    runner.on("/usr/bin/rpm --eval", ok("%{_arch}\n"));
    let rpm = Rpm::new(SYSTEM_RPM, version("4.14.2"));

    assert!(rpm.query_arch(&runner).is_err());

    runner.on("/usr/bin/rpm --eval", ok("aarch64\n"));
    assert_eq!(rpm.query_arch(&runner).expect("must read arch"), "aarch64");
}

#[test]
fn fedora_detection_prefers_dnf_and_respects_arch_override() {
    let rpm = Rpm::new(SYSTEM_RPM, version("4.14.2"));
    let runner = ScriptedRunner::new();
    runner.on("/usr/bin/rpm --eval", ok("x86_64\n"));

    let detected = PackageManager::detect(
        rpmpy_core::DistributionFamily::Fedora,
        &rpm,
        None,
        &runner,
    )
    .expect("must detect");
    assert_eq!(detected.package_tool(), "dnf");

    runner.without_program("dnf");
    let detected = PackageManager::detect(
        rpmpy_core::DistributionFamily::Fedora,
        &rpm,
        Some("i686"),
        &runner,
    )
    .expect("must detect");
    match detected {
        PackageManager::Fedora(backend) => {
            assert_eq!(backend.tool(), FedoraTool::Yum);
            assert_eq!(backend.arch(), "i686");
        }
        other => panic!("unexpected package manager: {other:?}"),
    }
}

#[test]
fn python_probe_reads_version_and_site_packages() {
    let runner = ScriptedRunner::new();
    runner.on(
        &format!("{VENV_PYTHON} -c"),
        ok("3.6.8\n/opt/venv/lib/python3.6/site-packages\n"),
    );

    let python = Python::probe(&runner, Path::new(VENV_PYTHON)).expect("must probe python");
    assert_eq!(python.major(), 3);
    assert_eq!(python.short_version(), "3.6");
    assert_eq!(
        python.binding_dir(),
        PathBuf::from("/opt/venv/lib/python3.6/site-packages/rpm")
    );
    assert!(!python.is_system());
    assert!(Python::new("/usr/bin/python3", VersionInfo::parse("3.6.8"), "/x").is_system());
}

#[test]
fn pip_json_listing_detects_binding() {
    let root = test_dir("pip-json");
    let python = venv_python(&root, "3.6.8");
    let (logger, _) = Logger::capturing(true);
    let runner = ScriptedRunner::new();
    runner
        .on(
            &format!("{VENV_PYTHON} -m pip --version"),
            ok("pip 18.1 from /opt/venv/lib/python3.6/site-packages/pip (python 3.6)\n"),
        )
        .on(
            &format!("{VENV_PYTHON} -m pip list --format json"),
            ok(r#"[{"name": "six", "version": "1.11.0"}, {"name": "rpm", "version": "4.14.2"}]"#),
        );

    assert!(python
        .is_binding_installed_on_pip(&runner, &logger)
        .expect("must query pip"));

    runner.on(
        &format!("{VENV_PYTHON} -m pip list --format json"),
        ok(r#"[{"name": "six", "version": "1.11.0"}]"#),
    );
    assert!(!python
        .is_binding_installed_on_pip(&runner, &logger)
        .expect("must query pip"));
}

#[test]
fn old_pip_plain_listing_detects_binding() {
    let root = test_dir("pip-plain");
    let python = venv_python(&root, "3.6.8");
    let (logger, _) = Logger::capturing(false);
    let runner = ScriptedRunner::new();
    runner
        .on(&format!("{VENV_PYTHON} -m pip --version"), ok("pip 8.1.2 from /x (python 3.6)\n"))
        .on(
            &format!("{VENV_PYTHON} -m pip list"),
            ok("rpm-python (4.11.3)\nsix (1.10.0)\n"),
        );

    assert!(python
        .is_binding_installed_on_pip(&runner, &logger)
        .expect("must query pip"));
    assert!(!runner.called(&format!("{VENV_PYTHON} -m pip list --format")));
}

#[test]
fn binding_detection_falls_back_to_module_directory() {
    let root = test_dir("binding-dir");
    let python = venv_python(&root, "3.6.8");
    let (logger, _) = Logger::capturing(false);
    let runner = ScriptedRunner::new();

    assert!(!python.is_binding_installed(&runner, &logger));
    write_file(&python.binding_dir().join("__init__.py"), "");
    assert!(python.is_binding_installed(&runner, &logger));
}

#[test]
fn suse_picks_newest_downloaded_package() {
    let cache = test_dir("suse-cache");
    for name in [
        "x86_64/rpm-python-4.11.2-15.1.x86_64.rpm",
        "x86_64/rpm-python-4.11.2-16.1.x86_64.rpm",
        "x86_64/rpm-python-4.9.1-1.x86_64.rpm",
        "x86_64/rpm-python-devel-9.0-1.x86_64.rpm",
    ] {
        write_file(&cache.join(name), "rpm");
    }

    let newest = newest_package_file(&cache, "rpm-python")
        .expect("must scan cache")
        .expect("must find package");
    assert_eq!(
        newest.file_name().and_then(|name| name.to_str()),
        Some("rpm-python-4.11.2-16.1.x86_64.rpm")
    );
    assert!(newest_package_file(&cache, "python3-rpm")
        .expect("must scan cache")
        .is_none());
}

#[test]
fn rpm_file_name_parses_name_version_release_arch() {
    let parsed = RpmFileName::parse("python3-rpm-4.14.1-10.fc28.x86_64.rpm").expect("must parse");
    assert_eq!(parsed.name, "python3-rpm");
    assert_eq!(parsed.version, "4.14.1");
    assert_eq!(parsed.release, "10.fc28");
    assert_eq!(parsed.arch, "x86_64");
    assert!(RpmFileName::parse("README.md").is_none());
}

#[test]
fn download_not_found_is_classified_per_family() {
    let backend = FedoraBackend::new(SYSTEM_RPM, FedoraTool::Dnf, "x86_64");
    assert!(backend.is_not_found(
        "python2-rpm",
        &failed(1, "", "No package python2-rpm.x86_64 available.")
    ));
    assert!(backend.is_not_found(
        "python2-rpm",
        &failed(1, "", "Error: No match for argument: python2-rpm.x86_64")
    ));
    assert!(!backend.is_not_found("python2-rpm", &failed(1, "", "Curl error (6)")));

    assert!(crate::suse::is_not_found(
        "rpm-python",
        &failed(ZYPPER_EXIT_INF_CAP_NOT_FOUND, "", "")
    ));
    assert!(crate::suse::is_not_found(
        "rpm-python",
        &failed(4, "Package 'rpm-python' not found.", "")
    ));
    assert!(!crate::suse::is_not_found(
        "rpm-python",
        &failed(8, "", "Repository is locked")
    ));

    assert!(crate::debian::is_not_found(&failed(
        100,
        "",
        "E: Unable to locate package python-rpm"
    )));
    assert!(!crate::debian::is_not_found(&failed(100, "", "E: Could not open lock file")));
}

#[test]
fn fedora_download_reports_missing_package_and_fails_on_other_errors() {
    let dest = test_dir("dnf-download");
    let package_manager = fedora();
    let runner = ScriptedRunner::new();
    runner.on(
        "dnf download python2-rpm.x86_64",
        failed(1, "", "No match for argument: python2-rpm.x86_64"),
    );

    assert_eq!(
        package_manager
            .download(&runner, "python2-rpm", &dest)
            .expect("missing package is not an error"),
        DownloadOutcome::NotFound
    );

    runner.on(
        "dnf download python2-rpm.x86_64",
        failed(1, "", "Failed to download metadata for repo 'fedora'"),
    );
    let err = package_manager
        .download(&runner, "python2-rpm", &dest)
        .expect_err("repository failure must be an error");
    assert!(err.to_string().contains("failed to download package python2-rpm.x86_64"));
}

#[test]
fn fedora_download_finds_downloaded_file() {
    let dest = test_dir("dnf-download-ok");
    let package_manager = fedora();
    let runner = ScriptedRunner::new();
    runner.on_with("dnf download rpm-build-libs.x86_64", |command| {
        let dir = command.get_current_dir().expect("download runs in dest dir");
        fs::write(dir.join("rpm-build-libs-4.14.2-1.fc29.x86_64.rpm"), "rpm")
            .expect("must write package");
        ok("")
    });

    let outcome = package_manager
        .download(&runner, "rpm-build-libs", &dest)
        .expect("must download");
    assert_eq!(
        outcome,
        DownloadOutcome::Downloaded(dest.join("rpm-build-libs-4.14.2-1.fc29.x86_64.rpm"))
    );
    assert!(runner
        .calls()
        .iter()
        .all(|call| !call.starts_with("yumdownloader")));
}

#[test]
fn binding_package_names_follow_rpm_and_python_versions() {
    let package_manager = fedora();
    assert_eq!(
        package_manager.binding_package_names(&version("4.13.0"), 3),
        vec!["python3-rpm", "rpm-python3"]
    );
    assert_eq!(
        package_manager.binding_package_names(&version("4.14.2"), 3),
        vec!["python3-rpm"]
    );
    assert_eq!(
        package_manager.binding_package_names(&version("4.11.3"), 2),
        vec!["rpm-python"]
    );
    assert!(package_manager
        .binding_package_names(&version("4.8.0"), 3)
        .is_empty());
    assert!(PackageManager::Debian(DebianBackend::default())
        .binding_package_names(&version("4.14.2"), 3)
        .is_empty());
}

#[test]
fn build_libs_split_only_on_fedora_from_4_9() {
    let package_manager = fedora();
    assert!(package_manager.has_build_libs_split(&version("4.9.0")));
    assert!(!package_manager.has_build_libs_split(&version("4.8.1")));
    assert!(!PackageManager::Suse(SuseBackend::new(SYSTEM_RPM))
        .has_build_libs_split(&version("4.14.1")));
}

#[test]
fn system_python_with_binding_is_skipped() {
    let root = test_dir("skip");
    let python = Python::new(
        "/usr/bin/python3",
        VersionInfo::parse("3.6.8"),
        root.join("site-packages"),
    );
    write_file(&python.binding_dir().join("__init__.py"), "");
    let rpm = Rpm::new(SYSTEM_RPM, version("4.14.2"));
    let package_manager = fedora();
    let runner = ScriptedRunner::new();
    let (logger, captured) = Logger::capturing(false);
    let ctx = context(&rpm, &python, &package_manager, &runner, &logger, &root);

    assert_eq!(
        verify_system_status(&ctx, false).expect("must verify"),
        Verification::Skip
    );
    assert!(captured.contains("already installed on system Python"));
}

#[test]
fn system_python_without_binding_requires_opt_in() {
    let root = test_dir("system-python");
    let python = Python::new(
        "/usr/bin/python3",
        VersionInfo::parse("3.6.8"),
        root.join("site-packages"),
    );
    let rpm = Rpm::new("/opt/rpm/bin/rpm", version("4.14.2"));
    let package_manager = fedora();
    let runner = ScriptedRunner::new();
    let (logger, captured) = Logger::capturing(false);
    let ctx = context(&rpm, &python, &package_manager, &runner, &logger, &root);

    let err = verify_system_status(&ctx, false).expect_err("must refuse system Python");
    assert!(err.to_string().contains("RPM_PY_SYS=true"));

    assert_eq!(
        verify_system_status(&ctx, true).expect("must proceed"),
        Verification::Proceed
    );
    assert!(captured.contains("[WARN]"));
}

#[test]
fn python2_is_rejected_for_rpm_4_16() {
    let root = test_dir("python2");
    let python = Python::new("/opt/py2/bin/python", VersionInfo::parse("2.7.18"), &root);
    let rpm = Rpm::new("/opt/rpm/bin/rpm", version("4.16.1.3"));
    let package_manager = fedora();
    let runner = ScriptedRunner::new();
    let (logger, _) = Logger::capturing(false);
    let ctx = context(&rpm, &python, &package_manager, &runner, &logger, &root);

    let err = verify_system_status(&ctx, false).expect_err("must reject Python 2");
    assert_eq!(err.to_string(), "RPM version >= 4.16 does not support Python 2.");
}

#[test]
fn system_rpm_requires_runtime_and_build_libs_or_download_plugin() {
    let root = test_dir("rpm-packages");
    let python = venv_python(&root, "3.6.8");
    let rpm = Rpm::new(SYSTEM_RPM, version("4.14.2"));
    let package_manager = fedora();
    let runner = ScriptedRunner::new();
    let (logger, _) = Logger::capturing(false);
    let ctx = context(&rpm, &python, &package_manager, &runner, &logger, &root);

    let err = verify_system_status(&ctx, false).expect_err("rpm-libs missing");
    assert!(err.to_string().contains("Required RPM not installed: [rpm-libs]"));

    runner.on("/usr/bin/rpm --query rpm-libs --quiet", ok(""));
    let err = verify_system_status(&ctx, false).expect_err("no build libs, no plugin");
    assert!(err.to_string().contains("rpm-build-libs"));
    assert!(err.to_string().contains("dnf-plugins-core (dnf)"));

    runner.on("/usr/bin/rpm --query dnf-plugins-core --quiet", ok(""));
    assert_eq!(
        verify_system_status(&ctx, false).expect("must proceed"),
        Verification::Proceed
    );
}

#[test]
fn debian_libraries_are_linked_into_source_tree() {
    let root = test_dir("stage-debian");
    let lib_root = root.join("usr-lib");
    let multiarch = lib_root.join("x86_64-linux-gnu");
    create_libraries(&multiarch, &["rpmio", "rpm", "rpmbuild", "rpmsign"]);
    let top_dir = root.join("rpm-4.14.2");
    write_source_tree(&top_dir, false);

    let rpm = Rpm::new(SYSTEM_RPM, version("4.14.2"));
    let python = venv_python(&root, "3.6.8");
    let package_manager = PackageManager::Debian(DebianBackend::new(&lib_root));
    let runner = ScriptedRunner::new();
    let (logger, _) = Logger::capturing(true);
    let ctx = context(&rpm, &python, &package_manager, &runner, &logger, &root);

    let lib_dir = package_manager.lib_dir(&runner).expect("must find librpm");
    assert_eq!(lib_dir, multiarch);
    let links = stage_libraries(&ctx, &top_dir, &top_dir.join("python"), &lib_dir)
        .expect("must stage");
    assert_eq!(
        links,
        vec![
            top_dir.join("rpmio/.libs/librpmio.so"),
            top_dir.join("lib/.libs/librpm.so"),
            top_dir.join("build/.libs/librpmbuild.so"),
            top_dir.join("sign/.libs/librpmsign.so"),
        ]
    );
    assert_eq!(
        fs::read_link(&links[1]).expect("must be a link"),
        multiarch.join("librpm.so.8")
    );
    assert!(runner.calls().is_empty());
}

#[test]
fn missing_required_library_fails_staging_but_rpmsign_is_optional() {
    let root = test_dir("stage-missing");
    let lib_root = root.join("usr-lib");
    create_libraries(&lib_root, &["rpmio", "rpm", "rpmbuild"]);
    let top_dir = root.join("rpm");
    write_source_tree(&top_dir, false);

    let rpm = Rpm::new(SYSTEM_RPM, version("4.14.2"));
    let python = venv_python(&root, "3.6.8");
    let package_manager = PackageManager::Debian(DebianBackend::new(&lib_root));
    let runner = ScriptedRunner::new();
    let (logger, captured) = Logger::capturing(true);
    let ctx = context(&rpm, &python, &package_manager, &runner, &logger, &root);

    let links = stage_libraries(&ctx, &top_dir, &top_dir.join("python"), &lib_root)
        .expect("must stage");
    assert_eq!(links.len(), 3);
    assert!(captured.contains("Skip creating symbolic link of not existed so file 'rpmsign'"));

    fs::remove_file(lib_root.join("librpmbuild.so.8")).expect("must remove library");
    let err = stage_libraries(&ctx, &top_dir, &top_dir.join("python"), &lib_root)
        .expect_err("rpmbuild is required");
    assert!(err.to_string().contains("librpmbuild.so*"));
}

#[test]
fn headers_keep_layout_below_include_rpm() {
    let top_dir = test_dir("headers");
    write_source_tree(&top_dir, false);
    write_file(&top_dir.join("lib").join("nested").join("inner.h"), "");

    let copied = stage_headers(&top_dir).expect("must copy headers");
    assert!(copied.contains(&top_dir.join("include/rpm/rpmio.h")));
    assert!(copied.contains(&top_dir.join("include/rpm/rpmlib.h")));
    assert!(copied.contains(&top_dir.join("include/rpm/nested/inner.h")));
    assert!(top_dir.join("include/rpm/rpmsign.h").is_file());
}

#[test]
fn popt_need_is_read_from_rpmlib_header() {
    let with_popt = test_dir("popt-yes");
    write_source_tree(&with_popt, true);
    stage_headers(&with_popt).expect("must copy headers");
    assert!(needs_popt(&with_popt).expect("must read header"));

    let without_popt = test_dir("popt-no");
    write_source_tree(&without_popt, false);
    stage_headers(&without_popt).expect("must copy headers");
    assert!(!needs_popt(&without_popt).expect("must read header"));

    assert!(needs_popt(&test_dir("popt-missing")).is_err());
}

#[test]
fn binding_dir_in_extracted_package_prefers_matching_python() {
    let extract_dir = test_dir("extracted");
    fs::create_dir_all(extract_dir.join("usr/lib/python2.7/site-packages/rpm"))
        .expect("must create dir");
    fs::create_dir_all(extract_dir.join("usr/lib64/python3.6/site-packages/rpm"))
        .expect("must create dir");

    assert_eq!(
        find_binding_dir(&extract_dir, "3.6").expect("must find"),
        extract_dir.join("usr/lib64/python3.6/site-packages/rpm")
    );
    assert_eq!(
        find_binding_dir(&extract_dir, "3.9").expect("must find"),
        extract_dir.join("usr/lib/python2.7/site-packages/rpm")
    );
    let err = find_binding_dir(&test_dir("extracted-empty"), "3.6").expect_err("nothing there");
    assert_eq!(err.to_string(), "site-packages/rpm directory not found.");
}

#[test]
#[serial]
fn dir_guard_restores_previous_directory() {
    let target = test_dir("dir-guard");
    let before = std::env::current_dir().expect("must read cwd");
    {
        let guard = DirGuard::enter(&target).expect("must enter");
        assert_eq!(guard.previous(), before.as_path());
        assert_eq!(
            std::env::current_dir()
                .expect("must read cwd")
                .canonicalize()
                .expect("must canonicalize"),
            target.canonicalize().expect("must canonicalize")
        );
    }
    assert_eq!(std::env::current_dir().expect("must read cwd"), before);
}

#[test]
fn force_symlink_replaces_existing_link() {
    let root = test_dir("symlink");
    write_file(&root.join("a.so.1"), "a");
    write_file(&root.join("b.so.1"), "b");
    let link = root.join("out").join("lib.so");

    force_symlink(&root.join("a.so.1"), &link).expect("must link");
    force_symlink(&root.join("b.so.1"), &link).expect("must relink");
    assert_eq!(fs::read_link(&link).expect("must read link"), root.join("b.so.1"));
}

#[test]
fn fedora_install_without_devel_builds_from_git_source() {
    let root = test_dir("e2e-fedora");
    let lib_dir = root.join("usr-lib64");
    create_libraries(&lib_dir, &["rpmio", "rpm", "rpmbuild", "rpmsign"]);
    let work_dir = root.join("work");
    fs::create_dir_all(&work_dir).expect("must create work dir");

    let rpm = Rpm::new(SYSTEM_RPM, version("4.13.0"));
    let python = venv_python(&root, "3.6.8");
    let package_manager = fedora();
    let runner = fedora_runner(&lib_dir);
    let (logger, _) = Logger::capturing(true);
    let transport = GitOnlyTransport::new("rpm-4.13.x");
    let ctx = context(&rpm, &python, &package_manager, &runner, &logger, &work_dir);

    let mut orchestrator = InstallOrchestrator::new(ctx, &transport, InstallOptions::default());
    let state = orchestrator.run().expect("install must succeed");

    assert_eq!(state, InstallState::Installed);
    assert_eq!(
        orchestrator.trace(),
        &[
            InstallState::Start,
            InstallState::SystemVerified,
            InstallState::DependenciesStaged,
            InstallState::DescriptorPatched,
            InstallState::Built,
            InstallState::Installed,
        ]
    );
    assert_eq!(transport.cloned.borrow().as_slice(), ["rpm-4.13.x"]);

    let top_dir = work_dir.join("rpm");
    assert_eq!(
        fs::read_link(top_dir.join("lib/.libs/librpm.so")).expect("must link librpm"),
        lib_dir.join("librpm.so.8")
    );
    assert!(top_dir.join("include/rpm/rpmlib.h").is_file());

    let setup_py =
        fs::read_to_string(top_dir.join("python").join(OUTPUT_FILE_NAME)).expect("must render");
    assert!(setup_py.contains("version='4.13.0'"));
    assert!(!setup_py.contains("@VERSION@"));
    assert!(setup_py.contains("['rpm', 'rpmio']"));
    assert!(setup_py.contains(&format!("['{}']", lib_dir.display())));

    let build = runner
        .position(&format!("{VENV_PYTHON} setup.py -q build"))
        .expect("must build");
    let install = runner
        .position(&format!("{VENV_PYTHON} setup.py -q install"))
        .expect("must install");
    assert!(build < install);
}

#[test]
fn build_failure_without_devel_mentions_devel_package() {
    let root = test_dir("e2e-fail");
    let lib_dir = root.join("usr-lib64");
    create_libraries(&lib_dir, &["rpmio", "rpm", "rpmbuild"]);
    let work_dir = root.join("work");
    fs::create_dir_all(&work_dir).expect("must create work dir");

    let rpm = Rpm::new(SYSTEM_RPM, version("4.13.0"));
    let python = venv_python(&root, "3.6.8");
    let package_manager = fedora();
    let runner = fedora_runner(&lib_dir);
    runner.on(
        &format!("{VENV_PYTHON} setup.py -q build"),
        failed(1, "", "error: command 'gcc' failed"),
    );
    let (logger, _) = Logger::capturing(false);
    let transport = GitOnlyTransport::new("rpm-4.13.x");
    let ctx = context(&rpm, &python, &package_manager, &runner, &logger, &work_dir);

    let mut orchestrator = InstallOrchestrator::new(ctx, &transport, InstallOptions::default());
    let err = orchestrator.run().expect_err("build must fail");

    let rendered = format!("{err:#}");
    assert!(rendered.contains("Install failed without rpm-devel package"));
    assert!(rendered.contains("failed to build the RPM Python binding"));
    assert_eq!(orchestrator.state(), InstallState::Failed);
    assert_eq!(
        orchestrator.trace()[orchestrator.trace().len() - 2],
        InstallState::DescriptorPatched
    );
    assert!(!runner.called(&format!("{VENV_PYTHON} setup.py -q install")));
}

#[test]
fn explicit_git_branch_with_devel_installed_skips_staging() {
    let root = test_dir("e2e-branch");
    let work_dir = root.join("work");
    fs::create_dir_all(&work_dir).expect("must create work dir");

    let rpm = Rpm::new(SYSTEM_RPM, version("4.14.2"));
    let python = venv_python(&root, "3.6.8");
    let package_manager = fedora();
    let runner = fedora_runner(&root.join("unused"));
    runner
        .on("/usr/bin/rpm --query rpm-devel --quiet", ok(""))
        .on(&format!("{VENV_PYTHON} setup.py -v build"), ok(""))
        .on(&format!("{VENV_PYTHON} setup.py -v install"), ok(""));
    let (logger, _) = Logger::capturing(false);
    let transport = GitOnlyTransport::new("feature-x");
    let ctx = context(&rpm, &python, &package_manager, &runner, &logger, &work_dir);
    let options = InstallOptions {
        git_branch: Some("feature-x".to_string()),
        verbose: true,
        ..InstallOptions::default()
    };

    let mut orchestrator = InstallOrchestrator::new(ctx, &transport, options);
    assert_eq!(orchestrator.run().expect("must install"), InstallState::Installed);
    assert!(!runner.called("/usr/bin/rpm -ql"));
    assert!(!work_dir.join("rpm/lib/.libs").exists());

    let setup_py = fs::read_to_string(work_dir.join("rpm/python").join(OUTPUT_FILE_NAME))
        .expect("must render");
    assert!(setup_py.contains("pkgconfig('--cflags')"));
    assert!(setup_py.contains("from setuptools import setup, Extension"));
}

#[test]
fn binary_package_is_installed_when_preferred() {
    let root = test_dir("binary");
    let work_dir = root.join("work");
    fs::create_dir_all(&work_dir).expect("must create work dir");

    let rpm = Rpm::new("/opt/rpm/bin/rpm", version("4.14.2"));
    let python = venv_python(&root, "3.6.8");
    let package_manager = fedora();
    let runner = ScriptedRunner::new();
    runner
        .on_with("dnf download python3-rpm.x86_64", |command| {
            let dir = command.get_current_dir().expect("download runs in dest dir");
            fs::write(dir.join("python3-rpm-4.14.2-1.fc29.x86_64.rpm"), "rpm")
                .expect("must write package");
            ok("")
        })
        .on_with("sh -c rpm2cpio", |command| {
            let payload = command.get_args().nth(4).expect("payload argument");
            fs::write(payload, "cpio").expect("must write payload");
            ok("")
        })
        .on_with("sh -c cpio", |command| {
            let dir = command.get_current_dir().expect("extract runs in dest dir");
            let module = dir.join("usr/lib64/python3.6/site-packages/rpm");
            fs::create_dir_all(&module).expect("must create module dir");
            fs::write(module.join("__init__.py"), "# rpm").expect("must write module");
            ok("")
        });
    let (logger, _) = Logger::capturing(false);
    let transport = GitOnlyTransport::new("unused");
    let ctx = context(&rpm, &python, &package_manager, &runner, &logger, &work_dir);
    let options = InstallOptions {
        prefer_binary_package: true,
        ..InstallOptions::default()
    };

    let mut orchestrator = InstallOrchestrator::new(ctx, &transport, options);
    assert_eq!(
        orchestrator.run().expect("must install"),
        InstallState::InstalledFromBinaryPackage
    );
    assert_eq!(
        fs::read_to_string(python.binding_dir().join("__init__.py")).expect("must copy module"),
        "# rpm"
    );
    assert!(transport.cloned.borrow().is_empty());
}

#[test]
fn unavailable_source_fails_with_acquisition_context() {
    let root = test_dir("no-source");
    let work_dir = root.join("work");
    fs::create_dir_all(&work_dir).expect("must create work dir");

    let rpm = Rpm::new("/opt/rpm/bin/rpm", version("4.14.2"));
    let python = venv_python(&root, "3.6.8");
    let package_manager = fedora();
    let runner = ScriptedRunner::new();
    let (logger, _) = Logger::capturing(false);
    // Neither the stable branch nor master can be cloned.
    let transport = GitOnlyTransport::new("rpm-4.13.x");
    let ctx = context(&rpm, &python, &package_manager, &runner, &logger, &work_dir);

    let mut orchestrator = InstallOrchestrator::new(ctx, &transport, InstallOptions::default());
    let err = orchestrator.run().expect_err("must fail");
    assert!(format!("{err:#}").contains("failed to acquire rpm 4.14.2 sources"));
    assert_eq!(transport.cloned.borrow().as_slice(), ["master"]);
    assert_eq!(
        orchestrator.trace(),
        &[
            InstallState::Start,
            InstallState::SystemVerified,
            InstallState::Failed
        ]
    );
}

#[test]
fn fedora_install_downloads_build_libs_and_popt_devel() {
    let root = test_dir("e2e-build-libs");
    let lib_dir = root.join("usr-lib64");
    create_libraries(&lib_dir, &["rpmio", "rpm", "popt"]);
    let work_dir = root.join("work");
    fs::create_dir_all(&work_dir).expect("must create work dir");

    let rpm = Rpm::new(SYSTEM_RPM, version("4.14.2"));
    let python = venv_python(&root, "3.6.8");
    let package_manager = fedora();
    let runner = fedora_runner(&lib_dir);
    runner
        .on("/usr/bin/rpm --query rpm-build-libs --quiet", failed(1, "", ""))
        .on("/usr/bin/rpm --query popt-devel --quiet", failed(1, "", ""))
        .on(
            "dnf download rpm-sign-libs.x86_64",
            failed(1, "", "Failed to download metadata for repo 'updates'"),
        );
    script_rpm_extraction(&runner);
    script_dnf_download(
        &runner,
        "rpm-build-libs",
        "rpm-build-libs-4.14.2-1.fc29.x86_64.rpm",
        vec![
            payload_entry(&lib_dir, "librpmbuild.so.8"),
            payload_entry(&lib_dir, "librpmsign.so.8"),
        ],
    );
    script_dnf_download(
        &runner,
        "popt-devel",
        "popt-devel-1.16-14.fc29.x86_64.rpm",
        vec![payload_entry(Path::new(DEFAULT_INCLUDE_DIR), "popt.h")],
    );
    let (logger, captured) = Logger::capturing(true);
    let mut transport = GitOnlyTransport::new("rpm-4.14.x");
    transport.popt_in_rpmlib = true;
    let ctx = context(&rpm, &python, &package_manager, &runner, &logger, &work_dir);

    let mut orchestrator = InstallOrchestrator::new(ctx, &transport, InstallOptions::default());
    assert_eq!(orchestrator.run().expect("must install"), InstallState::Installed);
    assert_eq!(
        orchestrator.trace(),
        &[
            InstallState::Start,
            InstallState::SystemVerified,
            InstallState::DependenciesStaged,
            InstallState::DescriptorPatched,
            InstallState::Built,
            InstallState::Installed,
        ]
    );

    let top_dir = work_dir.join("rpm");
    let extracted_lib_dir = top_dir
        .join("python")
        .join(lib_dir.strip_prefix("/").expect("lib dir is absolute"));
    assert_eq!(
        fs::read_link(top_dir.join("build/.libs/librpmbuild.so")).expect("must link rpmbuild"),
        extracted_lib_dir.join("librpmbuild.so.8")
    );
    assert_eq!(
        fs::read_link(top_dir.join("sign/.libs/librpmsign.so")).expect("must link rpmsign"),
        extracted_lib_dir.join("librpmsign.so.8")
    );
    assert_eq!(
        fs::read_link(top_dir.join("lib/.libs/librpm.so")).expect("must link librpm"),
        lib_dir.join("librpm.so.8")
    );
    assert!(captured.contains("Skipped rpm-sign-libs"));

    assert_eq!(
        fs::read_link(top_dir.join("lib/.libs/libpopt.so")).expect("must link popt"),
        lib_dir.join("libpopt.so.8")
    );
    assert!(top_dir.join("include/popt.h").is_file());

    let payloads = find_files(&top_dir.join("python"), "*.cpio", None).expect("must scan");
    assert!(payloads.is_empty());
    let lib_dir_queries = runner
        .calls()
        .iter()
        .filter(|call| call.starts_with("/usr/bin/rpm -ql"))
        .count();
    assert_eq!(lib_dir_queries, 1);
}

#[test]
fn popt_staging_names_the_missing_prerequisite() {
    let root = test_dir("popt-errors");
    let lib_dir = root.join("usr-lib64");
    create_libraries(&lib_dir, &["popt"]);
    let top_dir = root.join("rpm");
    write_source_tree(&top_dir, true);
    stage_headers(&top_dir).expect("must copy headers");

    let rpm = Rpm::new(SYSTEM_RPM, version("4.14.2"));
    let python = venv_python(&root, "3.6.8");
    let package_manager = fedora();
    let runner = ScriptedRunner::new();
    runner
        .on("/usr/bin/rpm --query", ok(""))
        .on("/usr/bin/rpm --query popt-devel --quiet", failed(1, "", ""))
        .on("/usr/bin/rpm --query dnf-plugins-core --quiet", failed(1, "", ""));
    let (logger, _) = Logger::capturing(false);
    let ctx = context(&rpm, &python, &package_manager, &runner, &logger, &root);
    let binding_dir = top_dir.join("python");

    let err = stage_popt(&ctx, &top_dir, &binding_dir, &lib_dir)
        .expect_err("popt-devel cannot be fetched");
    assert!(err.to_string().contains("Install a dnf download plugin"));
    assert!(err.to_string().contains("[popt-devel]"));

    runner
        .on("/usr/bin/rpm --query dnf-plugins-core --quiet", ok(""))
        .on("/usr/bin/rpm --query popt --quiet", failed(1, "", ""));
    let err = stage_popt(&ctx, &top_dir, &binding_dir, &lib_dir)
        .expect_err("popt runtime is required");
    assert!(err.to_string().contains("Required RPM not installed: [popt]"));
    assert!(!runner.called("dnf download"));
    assert!(!top_dir.join("lib/.libs/libpopt.so").exists());
}

#[test]
fn suse_download_moves_newest_cached_package() {
    let dest = test_dir("zypper-download");
    let package_manager = PackageManager::Suse(SuseBackend::new(SYSTEM_RPM));
    let runner = ScriptedRunner::new();
    runner.on_with("zypper --non-interactive --pkg-cache-dir", |command| {
        let args = command.get_args().map(PathBuf::from).collect::<Vec<_>>();
        assert_eq!(args[1], PathBuf::from("--pkg-cache-dir"));
        assert!(args.contains(&PathBuf::from("--download-only")));
        let cache = args[2].join("repo-oss").join("x86_64");
        write_file(&cache.join("popt-devel-1.16-6.0.1.x86_64.rpm"), "old");
        write_file(&cache.join("popt-devel-1.16-6.1.x86_64.rpm"), "new");
        ok("")
    });

    let outcome = package_manager
        .download(&runner, "popt-devel", &dest)
        .expect("must download");
    let moved = dest.join("popt-devel-1.16-6.1.x86_64.rpm");
    assert_eq!(outcome, DownloadOutcome::Downloaded(moved.clone()));
    assert_eq!(fs::read_to_string(&moved).expect("must move package"), "new");
    let cached = find_files(&dest, "popt-devel-*.rpm", None).expect("must scan");
    assert_eq!(cached.len(), 2);

    runner.on(
        "zypper --non-interactive --pkg-cache-dir",
        failed(ZYPPER_EXIT_INF_CAP_NOT_FOUND, "", ""),
    );
    assert_eq!(
        package_manager
            .download(&runner, "nope", &dest)
            .expect("missing package is not an error"),
        DownloadOutcome::NotFound
    );

    runner.on(
        "zypper --non-interactive --pkg-cache-dir",
        failed(8, "", "System management is locked by the application with pid 42"),
    );
    let err = package_manager
        .download(&runner, "nope", &dest)
        .expect_err("locked zypper must be an error");
    assert!(err.to_string().contains("failed to download package nope"));
    assert!(err.to_string().contains("status=8"));
}

#[test]
fn debian_download_and_extract_use_apt_and_dpkg() {
    let dest = test_dir("apt-download");
    let package_manager = PackageManager::Debian(DebianBackend::default());
    let runner = ScriptedRunner::new();
    runner
        .on_with("apt-get download libpopt-dev", |command| {
            let dir = command.get_current_dir().expect("download runs in dest dir");
            fs::write(dir.join("libpopt-dev_1.16-12_amd64.deb"), "deb")
                .expect("must write package");
            ok("")
        })
        .on("dpkg-deb -x", ok(""));
    let (logger, _) = Logger::capturing(false);

    let package_file = dest.join("libpopt-dev_1.16-12_amd64.deb");
    assert_eq!(
        package_manager
            .download_and_extract(&runner, &logger, "libpopt-dev", &dest)
            .expect("must download"),
        DownloadOutcome::Downloaded(package_file.clone())
    );
    assert!(runner.called(&format!(
        "dpkg-deb -x {} {}",
        package_file.display(),
        dest.display()
    )));

    runner.on(
        "apt-get download libpopt-dev",
        failed(100, "", "E: Unable to locate package libpopt-dev"),
    );
    assert_eq!(
        package_manager
            .download(&runner, "libpopt-dev", &dest)
            .expect("missing package is not an error"),
        DownloadOutcome::NotFound
    );

    runner.on(
        "apt-get download libpopt-dev",
        failed(100, "", "E: Could not get lock /var/cache/apt/archives/lock"),
    );
    let err = package_manager
        .download(&runner, "libpopt-dev", &dest)
        .expect_err("lock failure must be an error");
    assert!(err.to_string().contains("failed to download package libpopt-dev"));

    runner.on("dpkg-deb -x", failed(2, "", "dpkg-deb: error: not a Debian format archive"));
    let err = package_manager
        .extract(&runner, &package_file, &dest)
        .expect_err("broken archive must fail");
    assert!(err.to_string().contains("failed to extract"));
}

#[test]
fn rpm2cpio_failure_stops_extraction() {
    let dest = test_dir("rpm2cpio");
    let package_file = dest.join("popt-devel-1.16-14.fc29.x86_64.rpm");
    write_file(&package_file, "not an rpm");
    let package_manager = fedora();
    let runner = ScriptedRunner::new();
    runner
        .on("sh -c rpm2cpio", failed(1, "", "error: not an rpm package"))
        .on("sh -c cpio", ok(""));

    let err = package_manager
        .extract(&runner, &package_file, &dest)
        .expect_err("rpm2cpio failure must surface");
    assert!(err.to_string().contains("failed to convert"));
    assert!(err.to_string().contains("not an rpm package"));
    assert!(!runner.called("sh -c cpio"));

    // Exit status zero but nothing written.
    runner.on("sh -c rpm2cpio", ok(""));
    let err = package_manager
        .extract(&runner, &package_file, &dest)
        .expect_err("empty payload must fail");
    assert!(err.to_string().contains("rpm2cpio produced no payload"));
    assert!(!runner.called("sh -c cpio"));
}
