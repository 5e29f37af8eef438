#![no_main]

use codec::{
    BaselineAck, DecoderConfig, EntityDecoder, EntityIndex, ObjectError, ObjectSystem, PropertyState,
    SchemaPropertyCodec, SerialNumber,
};
use libfuzzer_sys::fuzz_target;
use schema::{ClassDef, ClassId, FieldCodec, FieldDef, FieldId, Schema};

/// Tracks live handles so double destroys and stale handles surface as panics.
#[derive(Default)]
struct Objects {
    next: u32,
    live: std::collections::BTreeMap<u32, PropertyState>,
}

impl ObjectSystem for Objects {
    type Handle = u32;

    fn create(
        &mut self,
        _index: EntityIndex,
        _serial: SerialNumber,
        _class: ClassId,
    ) -> Result<u32, ObjectError> {
        self.next += 1;
        self.live.insert(self.next, PropertyState::default());
        Ok(self.next)
    }

    fn destroy(&mut self, handle: u32) -> Result<(), ObjectError> {
        assert!(self.live.remove(&handle).is_some(), "double destroy");
        Ok(())
    }

    fn notify_visibility(&mut self, handle: &u32, _entered: bool) {
        assert!(self.live.contains_key(handle), "notify on dead handle");
    }

    fn properties(&self, handle: &u32) -> Option<&PropertyState> {
        self.live.get(handle)
    }

    fn apply_properties(&mut self, handle: &u32, state: PropertyState, _changed: &[usize]) {
        *self.live.get_mut(handle).expect("apply on dead handle") = state;
    }
}

fn schema() -> Schema {
    let class = ClassDef::new(ClassId::new(1), "Fuzz")
        .field(FieldDef::new(FieldId::new(1), FieldCodec::uint(5)))
        .field(FieldDef::new(FieldId::new(2), FieldCodec::var_sint()))
        .field(FieldDef::new(FieldId::new(3), FieldCodec::fixed_point(-100, 100, 10)));
    Schema::new(vec![class]).unwrap()
}

fuzz_target!(|data: &[u8]| {
    let mut decoder =
        EntityDecoder::new(DecoderConfig::for_testing(), SchemaPropertyCodec::new(schema()))
            .unwrap();
    decoder.register_zero_baselines().unwrap();
    let mut objects = Objects::default();
    let mut acks: Vec<BaselineAck> = Vec::new();

    // Length-prefixed frames, each fed as one message.
    let mut idx = 0usize;
    while idx < data.len() && idx < 4096 {
        let len = usize::from(data[idx]) % 96 + 1;
        idx += 1;
        let end = (idx + len).min(data.len());
        let _ = decoder.process(&data[idx..end], &mut objects, &mut acks);
        idx = end;
    }

    assert_eq!(decoder.objects().count(), objects.live.len());
    decoder.reset(&mut objects).unwrap();
    assert!(objects.live.is_empty());
});
