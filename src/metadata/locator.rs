//! Finds a named module in the target and the metadata root it points at

use super::layout::has_magic;
use crate::config::{Config, LocatorConfig, MetadataConfig};
use crate::core::types::{Address, LocateError, MemoryError, ModuleInfo, PointerWidth};
use crate::memory::{Endian, MemorySource, TargetReader};
use crate::process::ProcessHandle;
use tracing::{debug, warn};

/// Module lookup policy plus the location of the metadata directory
#[derive(Debug, Clone)]
pub struct ModuleLocator {
    root_rva_offset: u64,
    case_sensitive: bool,
}

impl Default for ModuleLocator {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ModuleLocator {
    pub fn new(metadata: &MetadataConfig, locator: &LocatorConfig) -> Self {
        ModuleLocator {
            root_rva_offset: metadata.root_rva_offset,
            case_sensitive: locator.case_sensitive,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.metadata, &config.locator)
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn root_rva_offset(&self) -> u64 {
        self.root_rva_offset
    }

    /// First loaded module whose file name or stem matches `module_name`
    pub fn find_module(
        &self,
        process: &dyn ProcessHandle,
        module_name: &str,
    ) -> Result<ModuleInfo, LocateError> {
        if !process.is_alive() {
            return Err(LocateError::ProcessUnavailable(format!(
                "{} (pid {}) has exited",
                process.name(),
                process.pid()
            )));
        }

        let modules = process.modules().map_err(|e| match e {
            MemoryError::ProcessUnavailable(msg) => LocateError::ProcessUnavailable(msg),
            other => LocateError::Memory(other),
        })?;

        let mut matches = modules
            .into_iter()
            .filter(|m| m.matches_name(module_name, self.case_sensitive));
        let module = matches.next().ok_or_else(|| {
            LocateError::module_not_found(
                module_name,
                format_args!("{} (pid {})", process.name(), process.pid()),
            )
        })?;
        if let Some(other) = matches.next() {
            debug!(
                "{} matches several modules; using {} at {} over {} at {}",
                module_name, module.name, module.base_address, other.name, other.base_address
            );
        }
        Ok(module)
    }

    /// Resolve `module_name` to a module with its `metadata_root` filled in.
    ///
    /// The directory is a little-endian u32 RVA at `base + root_rva_offset`;
    /// the root must lie inside the module and start with the table magic.
    pub fn locate(
        &self,
        process: &dyn ProcessHandle,
        source: &dyn MemorySource,
        module_name: &str,
    ) -> Result<ModuleInfo, LocateError> {
        let mut module = self.find_module(process, module_name)?;
        let root = self.read_root(&module, source)?;
        debug!(
            "Metadata root of {} at {} (module base {})",
            module.name, root, module.base_address
        );
        module.metadata_root = Some(root);
        Ok(module)
    }

    fn read_root(
        &self,
        module: &ModuleInfo,
        source: &dyn MemorySource,
    ) -> Result<Address, LocateError> {
        let no_metadata = |reason: String| {
            warn!("{}: {}", module.name, reason);
            LocateError::no_metadata(module.name.clone(), reason)
        };
        let memory_failure = |e: MemoryError, what: &str| match e {
            MemoryError::ProcessUnavailable(msg) => LocateError::ProcessUnavailable(msg),
            other => no_metadata(format!("cannot read {}: {}", what, other)),
        };

        if self.root_rva_offset.saturating_add(4) > module.size {
            return Err(no_metadata(format!(
                "directory offset 0x{:X} is beyond the {} byte module",
                self.root_rva_offset, module.size
            )));
        }
        let slot = module
            .base_address
            .offset(self.root_rva_offset)
            .map_err(|e| memory_failure(e, "the metadata directory"))?;

        let reader = TargetReader::new(source, Endian::Little, PointerWidth::Bits64);
        let rva = reader
            .read_u32(slot)
            .map_err(|e| memory_failure(e, "the metadata directory"))?;
        if rva == 0 {
            return Err(no_metadata("metadata directory is empty".to_string()));
        }

        let root = module
            .base_address
            .offset(u64::from(rva))
            .map_err(|e| memory_failure(e, "the metadata root"))?;
        if !module.contains_address(root) {
            return Err(no_metadata(format!(
                "metadata root RVA 0x{:X} points outside the module",
                rva
            )));
        }

        match has_magic(source, root) {
            Ok(true) => Ok(root),
            Ok(false) => Err(no_metadata(format!("no metadata magic at {}", root))),
            Err(e) => Err(memory_failure(e, "the metadata root")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{MemoryResult, ProcessArchitecture, ProcessInfo};
    use crate::memory::{MemoryRegion, SnapshotBuilder, SnapshotSource};
    use crate::metadata::image::{ImageBuilder, TypeSpec};

    const MODULE_BASE: Address = Address::new(0x7ff6_0000_0000);

    fn target(rva_offset: u64) -> SnapshotSource {
        let image = ImageBuilder::new(PointerWidth::Bits64)
            .with_type(TypeSpec::class("Game", "Player"))
            .build_module(MODULE_BASE, rva_offset)
            .unwrap();
        SnapshotBuilder::new(7, "game.exe", ProcessArchitecture::X64)
            .module("UnityPlayer.dll", Address::new(0x1000), 0x1000)
            .module("Assembly-CSharp.dll", MODULE_BASE, image.bytes.len() as u64)
            .region(image.base, &image.bytes)
            .build()
            .into_source()
            .unwrap()
    }

    #[test]
    fn test_locate_metadata_root() {
        let process = target(0x40);
        let module = ModuleLocator::default()
            .locate(&process, &process, "Assembly-CSharp")
            .unwrap();
        assert_eq!(module.name, "Assembly-CSharp.dll");
        let root = module.metadata_root.unwrap();
        assert!(module.contains_address(root));
        assert!(has_magic(&process, root).unwrap());
    }

    #[test]
    fn test_module_name_policy() {
        let process = target(0x40);
        let locator = ModuleLocator::default();
        assert!(locator.find_module(&process, "Assembly-CSharp.dll").is_ok());
        assert!(matches!(
            locator.find_module(&process, "assembly-csharp"),
            Err(LocateError::ModuleNotFound { .. })
        ));
        assert!(matches!(
            locator.find_module(&process, "Assembly"),
            Err(LocateError::ModuleNotFound { .. })
        ));
        assert!(locator
            .case_sensitive(false)
            .find_module(&process, "assembly-csharp")
            .is_ok());
    }

    #[test]
    fn test_module_not_found_names_the_process() {
        let process = target(0x40);
        let err = ModuleLocator::default()
            .locate(&process, &process, "GameAssembly")
            .unwrap_err();
        assert!(err.to_string().contains("game.exe"));
    }

    #[test]
    fn test_directory_at_other_offset() {
        let process = target(0x80);
        assert!(matches!(
            ModuleLocator::default().locate(&process, &process, "Assembly-CSharp"),
            Err(LocateError::NoMetadata { .. })
        ));

        let config = MetadataConfig {
            root_rva_offset: 0x80,
            ..MetadataConfig::default()
        };
        let locator = ModuleLocator::new(&config, &LocatorConfig::default());
        assert!(locator.locate(&process, &process, "Assembly-CSharp").is_ok());
    }

    #[test]
    fn test_module_without_metadata() {
        let snapshot = SnapshotBuilder::new(7, "game.exe", ProcessArchitecture::X64)
            .module("Assembly-CSharp.dll", MODULE_BASE, 0x2000)
            .region(MODULE_BASE, &[0u8; 0x2000])
            .build()
            .into_source()
            .unwrap();
        let err = ModuleLocator::default()
            .locate(&snapshot, &snapshot, "Assembly-CSharp")
            .unwrap_err();
        assert!(err.to_string().contains("directory is empty"));

        let unmapped = SnapshotBuilder::new(7, "game.exe", ProcessArchitecture::X64)
            .module("Assembly-CSharp.dll", MODULE_BASE, 0x2000)
            .build()
            .into_source()
            .unwrap();
        assert!(matches!(
            ModuleLocator::default().locate(&unmapped, &unmapped, "Assembly-CSharp"),
            Err(LocateError::NoMetadata { .. })
        ));
    }

    struct ExitedProcess(ProcessInfo);

    impl ProcessHandle for ExitedProcess {
        fn info(&self) -> &ProcessInfo {
            &self.0
        }

        fn is_alive(&self) -> bool {
            false
        }

        fn modules(&self) -> MemoryResult<Vec<ModuleInfo>> {
            Err(MemoryError::ProcessUnavailable("exited".to_string()))
        }
    }

    #[test]
    fn test_exited_process() {
        let process = ExitedProcess(ProcessInfo::new(9, "game.exe".to_string()));
        let memory = target(0x40);
        assert!(matches!(
            ModuleLocator::default().locate(&process, &memory, "Assembly-CSharp"),
            Err(LocateError::ProcessUnavailable(_))
        ));
        // The source is untouched
        assert!(memory.read(MemoryRegion::new(MODULE_BASE, 4)).is_ok());
    }
}
