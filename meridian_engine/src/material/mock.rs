//! Mock render device - test doubles for the GPU resource trait family
//!
//! Lets unit tests exercise materials and binding-table rotation without a
//! GPU. The mock backend routes through the real `BindingTableManager`, so
//! the bookkeeping under test is the production code; only the pool is fake.
//!
//! Everything here is #[cfg(test)] via the module declaration in mod.rs.

use crate::binding_table::{BindingTableManager, TablePool};
use crate::error::{Error, Result};
use crate::frame::FrameContext;
use crate::material::backend::MaterialBackend;
use crate::material::property::{Texture2DProperty, TextureCubeProperty, UniformBufferProperty};
use crate::reflection::{
    ReflectedSampledImage, ReflectedStorageBuffer, ReflectedUniformBuffer, Shader, ShaderId,
    ShaderReflection,
};
use crate::resources::{
    Image2D, ImageCube, ImageInfo, ImageSpec, MemoryClass, RenderDevice, StorageBuffer,
    UniformBuffer, UniformImage2D, UniformImageCube,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

// ===== SHADER =====

pub(crate) struct MockShader {
    id: ShaderId,
    name: String,
    reflection: ShaderReflection,
}

impl MockShader {
    pub(crate) fn new(name: &str, reflection: ShaderReflection) -> Arc<dyn Shader> {
        Arc::new(Self {
            id: ShaderId::next(),
            name: name.to_string(),
            reflection,
        })
    }
}

impl Shader for MockShader {
    fn id(&self) -> ShaderId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }
}

// ===== BUFFERS =====

pub(crate) struct MockUniformBuffer {
    size: u64,
    set: u32,
    binding: u32,
    shadow: Mutex<Vec<u8>>,
}

impl UniformBuffer for MockUniformBuffer {
    fn set_data(&self, data: &[u8], offset: u64) -> Result<()> {
        let end = offset.checked_add(data.len() as u64).unwrap_or(u64::MAX);
        if end > self.size {
            return Err(Error::InvalidResource(format!(
                "Uniform buffer write of {} bytes at offset {} exceeds size {}",
                data.len(),
                offset,
                self.size
            )));
        }
        let mut shadow = self.shadow.lock().unwrap();
        shadow[offset as usize..end as usize].copy_from_slice(data);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn set_index(&self) -> u32 {
        self.set
    }

    fn binding(&self) -> u32 {
        self.binding
    }

    fn shadow(&self) -> Vec<u8> {
        self.shadow.lock().unwrap().clone()
    }
}

pub(crate) struct MockStorageBuffer {
    set: u32,
    binding: u32,
    shadow: Mutex<Vec<u8>>,
}

impl StorageBuffer for MockStorageBuffer {
    fn set_data(&self, data: &[u8], offset: u64) -> Result<()> {
        let Some(end) = (offset as usize).checked_add(data.len()) else {
            return Err(Error::InvalidResource(format!(
                "Storage buffer write of {} bytes at offset {} overflows",
                data.len(),
                offset
            )));
        };
        let mut shadow = self.shadow.lock().unwrap();
        if end > shadow.len() {
            shadow.resize(end, 0);
        }
        shadow[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.shadow.lock().unwrap().len() as u64
    }

    fn set_index(&self) -> u32 {
        self.set
    }

    fn binding(&self) -> u32 {
        self.binding
    }

    fn shadow(&self) -> Vec<u8> {
        self.shadow.lock().unwrap().clone()
    }
}

// ===== IMAGES =====

pub(crate) struct MockImage2D {
    info: ImageInfo,
}

impl Image2D for MockImage2D {
    fn info(&self) -> ImageInfo {
        self.info
    }
}

pub(crate) struct MockImageCube {
    info: ImageInfo,
}

impl ImageCube for MockImageCube {
    fn info(&self) -> ImageInfo {
        self.info
    }
}

pub(crate) struct MockUniformImage2D {
    set: u32,
    binding: u32,
    bound: Mutex<Option<Arc<dyn Image2D>>>,
}

impl MockUniformImage2D {
    pub(crate) fn has_bound_image(&self) -> bool {
        self.bound.lock().unwrap().is_some()
    }
}

impl UniformImage2D for MockUniformImage2D {
    fn bind_image(&self, image: &Arc<dyn Image2D>) -> Result<()> {
        *self.bound.lock().unwrap() = Some(image.clone());
        Ok(())
    }

    fn set_index(&self) -> u32 {
        self.set
    }

    fn binding(&self) -> u32 {
        self.binding
    }
}

pub(crate) struct MockUniformImageCube {
    set: u32,
    binding: u32,
    bound: Mutex<Option<Arc<dyn ImageCube>>>,
}

impl UniformImageCube for MockUniformImageCube {
    fn bind_image(&self, image: &Arc<dyn ImageCube>) -> Result<()> {
        *self.bound.lock().unwrap() = Some(image.clone());
        Ok(())
    }

    fn set_index(&self) -> u32 {
        self.set
    }

    fn binding(&self) -> u32 {
        self.binding
    }
}

// ===== TABLE POOL =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MockUpdateKind {
    UniformBuffer,
    Texture2D,
    TextureCube,
}

/// One committed binding update, recorded for test assertions
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MockUpdate {
    pub table: u64,
    pub binding: u32,
    pub kind: MockUpdateKind,
}

/// Fake table pool: hands out sequential ids and records commits
pub(crate) struct MockTablePool {
    next_table: u64,
    committed: Arc<Mutex<Vec<MockUpdate>>>,
    commit_calls: Arc<Mutex<usize>>,
    fail_commit: Arc<AtomicBool>,
}

impl MockTablePool {
    /// Build a pool with an explicit first table id and shared commit log
    pub(crate) fn for_tests(
        first_table: u64,
        committed: Arc<Mutex<Vec<MockUpdate>>>,
        commit_calls: Arc<Mutex<usize>>,
        fail_commit: Arc<AtomicBool>,
    ) -> Self {
        Self {
            next_table: first_table,
            committed,
            commit_calls,
            fail_commit,
        }
    }
}

impl TablePool for MockTablePool {
    type Table = u64;
    type Update = MockUpdate;

    fn allocate(&mut self, _shader: ShaderId, _set_index: u32) -> Result<u64> {
        let table = self.next_table;
        self.next_table += 1;
        Ok(table)
    }

    fn commit(&mut self, updates: Vec<MockUpdate>) -> Result<()> {
        *self.commit_calls.lock().unwrap() += 1;
        if self.fail_commit.load(Ordering::Acquire) {
            return Err(Error::BackendError("Injected commit failure".to_string()));
        }
        self.committed.lock().unwrap().extend(updates);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        Ok(())
    }
}

// ===== MATERIAL BACKEND =====

pub(crate) struct MockMaterialBackend {
    shader: Arc<dyn Shader>,
    manager: Arc<Mutex<BindingTableManager<MockTablePool>>>,
    tables: FxHashMap<u32, u64>,

    /// Slots whose fresh tables have not been committed yet
    fresh_slots: FxHashSet<u32>,
}

impl MockMaterialBackend {
    fn table_for(&self, set: u32) -> Result<u64> {
        self.tables.get(&set).copied().ok_or_else(|| {
            Error::InvalidResource(format!("No table prepared for set {}", set))
        })
    }
}

impl MaterialBackend for MockMaterialBackend {
    fn prepare(&mut self, frame: &FrameContext) -> Result<bool> {
        let mut manager = self.manager.lock().unwrap();
        for set in 0..self.shader.reflection().set_count() {
            let (table, newly_allocated) =
                manager.get_or_allocate(frame.slot(), self.shader.id(), set)?;
            self.tables.insert(set, table);
            if newly_allocated {
                self.fresh_slots.insert(frame.slot());
            }
        }
        // A slot stays fresh until a flush for it succeeds, so a failed
        // flush re-records clean properties on the next apply
        Ok(self.fresh_slots.contains(&frame.slot()))
    }

    fn apply_uniform_buffer(
        &mut self,
        frame: &FrameContext,
        property: &UniformBufferProperty,
    ) -> Result<()> {
        let table = self.table_for(property.buffer().set_index())?;
        self.manager.lock().unwrap().record_update(
            frame.slot(),
            MockUpdate {
                table,
                binding: property.buffer().binding(),
                kind: MockUpdateKind::UniformBuffer,
            },
        )
    }

    fn apply_texture_2d(
        &mut self,
        frame: &FrameContext,
        property: &Texture2DProperty,
    ) -> Result<()> {
        let table = self.table_for(property.uniform().set_index())?;
        self.manager.lock().unwrap().record_update(
            frame.slot(),
            MockUpdate {
                table,
                binding: property.uniform().binding(),
                kind: MockUpdateKind::Texture2D,
            },
        )
    }

    fn apply_texture_cube(
        &mut self,
        frame: &FrameContext,
        property: &TextureCubeProperty,
    ) -> Result<()> {
        let table = self.table_for(property.uniform().set_index())?;
        self.manager.lock().unwrap().record_update(
            frame.slot(),
            MockUpdate {
                table,
                binding: property.uniform().binding(),
                kind: MockUpdateKind::TextureCube,
            },
        )
    }

    fn flush_updates(&mut self, frame: &FrameContext) -> Result<()> {
        self.manager.lock().unwrap().flush_updates(frame.slot())?;
        self.fresh_slots.remove(&frame.slot());
        Ok(())
    }
}

// ===== RENDER DEVICE =====

/// Mock device: creates mock resources and backends that share one
/// `BindingTableManager` and one committed-update log.
pub(crate) struct MockRenderDevice {
    manager: Arc<Mutex<BindingTableManager<MockTablePool>>>,
    frames_in_flight: u32,

    /// Every update committed through any backend, in commit order
    pub(crate) committed: Arc<Mutex<Vec<MockUpdate>>>,

    /// Number of pool commit calls (empty flushes don't count)
    pub(crate) commit_calls: Arc<Mutex<usize>>,

    /// When set, the next commits fail without recording anything
    pub(crate) fail_commit: Arc<AtomicBool>,
}

impl MockRenderDevice {
    pub(crate) fn new(frames_in_flight: u32) -> Self {
        let committed = Arc::new(Mutex::new(Vec::new()));
        let commit_calls = Arc::new(Mutex::new(0));
        let fail_commit = Arc::new(AtomicBool::new(false));
        let pools = (0..frames_in_flight)
            // Distinct id ranges per slot so cross-slot reuse is visible
            .map(|slot| {
                MockTablePool::for_tests(
                    (slot as u64) * 10_000,
                    committed.clone(),
                    commit_calls.clone(),
                    fail_commit.clone(),
                )
            })
            .collect();
        Self {
            manager: Arc::new(Mutex::new(BindingTableManager::new(pools))),
            frames_in_flight,
            committed,
            commit_calls,
            fail_commit,
        }
    }

    pub(crate) fn committed_count(&self) -> usize {
        self.committed.lock().unwrap().len()
    }
}

impl RenderDevice for MockRenderDevice {
    fn create_uniform_buffer(
        &self,
        desc: &ReflectedUniformBuffer,
        _class: MemoryClass,
    ) -> Result<Arc<dyn UniformBuffer>> {
        Ok(Arc::new(MockUniformBuffer {
            size: desc.size,
            set: desc.set,
            binding: desc.binding,
            shadow: Mutex::new(vec![0u8; desc.size as usize]),
        }))
    }

    fn create_storage_buffer(
        &self,
        desc: &ReflectedStorageBuffer,
        initial_capacity: u64,
        _class: MemoryClass,
    ) -> Result<Arc<dyn StorageBuffer>> {
        Ok(Arc::new(MockStorageBuffer {
            set: desc.set,
            binding: desc.binding,
            shadow: Mutex::new(vec![0u8; initial_capacity as usize]),
        }))
    }

    fn create_image_2d(&self, spec: &ImageSpec, _data: Option<&[u8]>) -> Result<Arc<dyn Image2D>> {
        Ok(Arc::new(MockImage2D {
            info: ImageInfo {
                width: spec.width,
                height: spec.height,
                format: spec.format,
            },
        }))
    }

    fn create_image_cube(
        &self,
        spec: &ImageSpec,
        _data: Option<&[u8]>,
    ) -> Result<Arc<dyn ImageCube>> {
        Ok(Arc::new(MockImageCube {
            info: ImageInfo {
                width: spec.width,
                height: spec.height,
                format: spec.format,
            },
        }))
    }

    fn create_uniform_image_2d(
        &self,
        slot: &ReflectedSampledImage,
    ) -> Result<Arc<dyn UniformImage2D>> {
        Ok(Arc::new(MockUniformImage2D {
            set: slot.set,
            binding: slot.binding,
            bound: Mutex::new(None),
        }))
    }

    fn create_uniform_image_cube(
        &self,
        slot: &ReflectedSampledImage,
    ) -> Result<Arc<dyn UniformImageCube>> {
        Ok(Arc::new(MockUniformImageCube {
            set: slot.set,
            binding: slot.binding,
            bound: Mutex::new(None),
        }))
    }

    fn create_material_backend(&self, shader: &Arc<dyn Shader>) -> Result<Box<dyn MaterialBackend>> {
        Ok(Box::new(MockMaterialBackend {
            shader: shader.clone(),
            manager: self.manager.clone(),
            tables: FxHashMap::default(),
            fresh_slots: FxHashSet::default(),
        }))
    }

    fn begin_frame(&self, frame: &FrameContext) -> Result<()> {
        self.manager.lock().unwrap().cleanup_frame(frame.slot())
    }

    fn frames_in_flight(&self) -> u32 {
        self.frames_in_flight
    }
}
