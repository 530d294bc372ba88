//! 序列化器注册表（C5）：类型与 id、类型与编解码器工厂之间的权威映射。
//!
//! `byType` 与 `byId` 在每次变更时都保持一致：绑定 `(T, id)` 会同时驱逐
//! `T` 此前的任何绑定以及 `id` 此前的任何归属者。按接口/超类查找（"声明顺序、
//! 首个命中者胜出"）表达为一份注册时捕获的、显式的、按声明顺序排列的祖先列表
//! （见 Design Notes），而不是每次编码时的反射式遍历——Rust 没有隐式类层级可走，
//! 祖先关系必须由注册方自行声明。
//!
//! 注册过程不是线程安全的；调用方应当在启动时配置好注册表，此后将其当作只读
//! （见 [`crate::engine`] 中据此成立的"无锁读者"约定）。

use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::CodecFactory;
use crate::error::{Result, VesperError};
use crate::typeid::{is_reserved, TypeHandle, TypeId};

/// 解析器是一个针对全新注册表执行的批量注册函数，也可以之后通过
/// [`SerializerRegistry::resolve`] 追加。
pub type Resolver = Arc<dyn Fn(&mut SerializerRegistry) -> Result<()> + Send + Sync>;

#[derive(Clone)]
struct TypeBinding {
    id: Option<TypeId>,
    name: Option<String>,
    factory: Arc<dyn CodecFactory>,
}

/// 一个类型的解析结果，由 lookup 系列方法返回。克隆成本很低：编解码器工厂
/// 是引用计数的。
#[derive(Clone)]
pub struct ResolvedType {
    pub handle: TypeHandle,
    pub id: Option<TypeId>,
    pub name: Option<String>,
    pub factory: Arc<dyn CodecFactory>,
}

/// 持有 C5 描述的两个索引。注册表可通过 [`Clone`] 低成本深拷贝——克隆之后，
/// 对任一副本的变更都彼此独立。
#[derive(Clone)]
pub struct SerializerRegistry {
    by_type: HashMap<TypeHandle, TypeBinding>,
    by_id: HashMap<u32, TypeHandle>,
    by_name: HashMap<String, TypeHandle>,
    /// 每个类型句柄按声明顺序排列的父类/接口句柄，在注册时一次性捕获，
    /// 而非每次编码时反射式遍历。
    ancestors: HashMap<TypeHandle, Vec<TypeHandle>>,
    next_auto_id: u32,
}

impl SerializerRegistry {
    /// 一个未应用任何默认解析器的空注册表。大多数调用方应使用
    /// [`SerializerRegistry::with_defaults`]。
    pub fn empty() -> Self {
        Self {
            by_type: HashMap::new(),
            by_id: HashMap::new(),
            by_name: HashMap::new(),
            ancestors: HashMap::new(),
            next_auto_id: 0,
        }
    }

    /// 依次应用基础解析器、JDK/标准解析器，再应用任何额外解析器。
    /// [`crate::engine::Engine::new`] 调用的就是这个。
    pub fn with_defaults(extra: &[Resolver]) -> Result<Self> {
        let mut registry = Self::empty();
        crate::resolver::primitive_resolver(&mut registry)?;
        crate::resolver::standard_resolver(&mut registry)?;
        for resolver in extra {
            registry.resolve(resolver)?;
        }
        Ok(registry)
    }

    /// 应用一个额外的批量注册函数；它只能追加绑定，不能像其他注册调用一样
    /// 重新指派保留 id。
    pub fn resolve(&mut self, resolver: &Resolver) -> Result<()> {
        resolver(self)
    }

    fn evict(&mut self, id: Option<u32>, name: Option<&str>, except: TypeHandle) {
        if let Some(id) = id {
            if let Some(prev_handle) = self.by_id.remove(&id) {
                if prev_handle != except {
                    if let Some(binding) = self.by_type.get_mut(&prev_handle) {
                        binding.id = None;
                    }
                }
            }
        }
        if let Some(name) = name {
            if let Some(prev_handle) = self.by_name.remove(name) {
                if prev_handle != except {
                    if let Some(binding) = self.by_type.get_mut(&prev_handle) {
                        binding.name = None;
                    }
                }
            }
        }
    }

    fn insert(
        &mut self,
        handle: TypeHandle,
        id: Option<u32>,
        name: Option<String>,
        factory: Arc<dyn CodecFactory>,
    ) -> Result<()> {
        if let Some(id) = id {
            if is_reserved(id) {
                return Err(VesperError::configuration(format!(
                    "id {id} falls in the reserved range [128,255]"
                )));
            }
        }
        // 注册 (T, id) 会驱逐此前的 (T, *) 与此前的 (*, id)；在触碰任何状态之前
        // 先完成上面的校验。
        self.evict(id, name.as_deref(), handle);
        if let Some(prev) = self.by_type.remove(&handle) {
            if let Some(prev_id) = prev.id {
                self.by_id.remove(&prev_id.value());
            }
            if let Some(prev_name) = prev.name {
                self.by_name.remove(&prev_name);
            }
        }
        if let Some(id) = id {
            self.by_id.insert(id, handle);
        }
        if let Some(name) = &name {
            self.by_name.insert(name.clone(), handle);
        }
        self.by_type.insert(
            handle,
            TypeBinding {
                id: id.map(TypeId::new),
                name,
                factory,
            },
        );
        Ok(())
    }

    /// `register(type, id)` —— 绑定一个具体 id 与工厂。若 `id` 保留或已绑定
    /// 给其他类型则失败。
    pub fn register_with_id<T: 'static>(
        &mut self,
        id: u32,
        factory: Arc<dyn CodecFactory>,
    ) -> Result<TypeId> {
        if self.by_id.contains_key(&id) && self.by_id.get(&id) != Some(&TypeHandle::of::<T>()) {
            return Err(VesperError::configuration(format!(
                "id {id} is already bound to another type"
            )));
        }
        let handle = TypeHandle::of::<T>();
        let name = Some(std::any::type_name::<T>().to_string());
        self.insert(handle, Some(id), name, factory)?;
        Ok(TypeId::new(id))
    }

    /// 声明当 `T` 自身没有绑定时 `lookup` 应回退查找的、按顺序排列的
    /// 超类/接口句柄列表。每个类型句柄只捕获一次，而非每次编码时重新发现。
    pub fn declare_ancestors<T: 'static>(&mut self, ancestors: Vec<TypeHandle>) {
        self.ancestors.insert(TypeHandle::of::<T>(), ancestors);
    }

    /// `register(type)` —— 在保留区间之外分配下一个可用 id。
    pub fn register_auto<T: 'static>(&mut self, factory: Arc<dyn CodecFactory>) -> Result<TypeId> {
        loop {
            let candidate = self.next_auto_id;
            self.next_auto_id = self.next_auto_id.wrapping_add(1);
            if is_reserved(candidate) || self.by_id.contains_key(&candidate) {
                continue;
            }
            return self.register_with_id::<T>(candidate, factory);
        }
    }

    /// `register(type, factoryOrCodec)` —— 不带 id 地绑定；该类型改用 CLASS
    /// 帧（在线上写出名字）。
    pub fn register_by_name<T: 'static>(
        &mut self,
        name: impl Into<String>,
        factory: Arc<dyn CodecFactory>,
    ) -> Result<()> {
        let handle = TypeHandle::of::<T>();
        self.insert(handle, None, Some(name.into()), factory)
    }

    /// 按句柄精确匹配查找，若未命中则回退到该句柄声明的祖先链
    /// （见 [`Self::declare_ancestors`]），按顺序尝试——
    /// "精确类 > 直接超类链 > 按声明顺序排列的接口"。
    pub fn lookup(&self, handle: TypeHandle) -> Option<ResolvedType> {
        if let Some(binding) = self.by_type.get(&handle) {
            return Some(Self::resolved(handle, binding));
        }
        for ancestor in self.ancestors.get(&handle).into_iter().flatten() {
            if let Some(binding) = self.by_type.get(ancestor) {
                return Some(Self::resolved(*ancestor, binding));
            }
        }
        None
    }

    pub fn lookup_by_id(&self, id: u32) -> Option<ResolvedType> {
        let handle = *self.by_id.get(&id)?;
        let binding = self.by_type.get(&handle)?;
        Some(Self::resolved(handle, binding))
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<ResolvedType> {
        let handle = *self.by_name.get(name)?;
        let binding = self.by_type.get(&handle)?;
        Some(Self::resolved(handle, binding))
    }

    fn resolved(handle: TypeHandle, binding: &TypeBinding) -> ResolvedType {
        ResolvedType {
            handle,
            id: binding.id,
            name: binding.name.clone(),
            factory: Arc::clone(&binding.factory),
        }
    }

    /// 只读视图：类型句柄 -> id，覆盖所有绑定了 id 的类型。
    pub fn ids(&self) -> HashMap<TypeHandle, u32> {
        self.by_type
            .iter()
            .filter_map(|(handle, binding)| binding.id.map(|id| (*handle, id.value())))
            .collect()
    }

    /// 只读视图：id -> 类型句柄。
    pub fn types(&self) -> HashMap<u32, TypeHandle> {
        self.by_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::builtins::IntCodec;

    struct Marker;

    fn int_factory() -> Arc<dyn CodecFactory> {
        crate::codec::single::<i32, IntCodec>(IntCodec)
    }

    #[test]
    fn register_then_evict_prior_id() {
        let mut registry = SerializerRegistry::empty();
        registry.register_with_id::<i32>(10, int_factory()).unwrap();
        assert_eq!(registry.lookup_by_id(10).unwrap().handle, TypeHandle::of::<i32>());
        registry.register_with_id::<i32>(11, int_factory()).unwrap();
        assert!(registry.lookup_by_id(10).is_none());
        assert_eq!(registry.lookup_by_id(11).unwrap().handle, TypeHandle::of::<i32>());
    }

    #[test]
    fn reserved_id_is_rejected_and_registry_unchanged() {
        let mut registry = SerializerRegistry::empty();
        let err = registry.register_with_id::<i32>(200, int_factory()).unwrap_err();
        assert!(matches!(err, VesperError::ConfigurationError { .. }));
        assert!(registry.ids().is_empty());
    }

    #[test]
    fn unrelated_marker_type_is_not_registered() {
        let registry = SerializerRegistry::empty();
        assert!(registry.lookup(TypeHandle::of::<Marker>()).is_none());
    }
}
