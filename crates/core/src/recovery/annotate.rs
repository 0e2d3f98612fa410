use log::info;

use crate::host::{HostError, TypeDatabase};
use crate::model::{ArchInfo, DataType, StringSliceRecord, StructField, StructType};
use crate::recovery::RecoveryConfig;

/// Packed `{ address: char*, length: uN }` with `N` the native word width.
pub fn slice_type_definition(arch: &ArchInfo) -> StructType {
    StructType::packed(vec![
        StructField {
            name: "address".into(),
            ty: DataType::pointer_to(DataType::Char, arch.pointer_width as u64),
        },
        StructField { name: "length".into(), ty: DataType::unsigned(arch.address_size as u64) },
    ])
}

/// Define the string-slice type unless the database already has it.
///
/// Returns whether the type was created.
pub fn ensure_slice_type<T: TypeDatabase + ?Sized>(
    types: &mut T,
    config: &RecoveryConfig,
    arch: &ArchInfo,
) -> Result<bool, HostError> {
    if types.type_exists(&config.slice_type_name) {
        return Ok(false);
    }
    types.define_named_type(&config.slice_type_name, slice_type_definition(arch))?;
    info!("Defined new {} type", config.slice_type_name);
    Ok(true)
}

/// Retype the string bytes as `char[length]` and the pair as a slice instance.
///
/// Any existing declaration at the data address is removed first.
pub fn annotate_slice<T: TypeDatabase + ?Sized>(
    types: &mut T,
    record: &StringSliceRecord,
    config: &RecoveryConfig,
) -> Result<(), HostError> {
    if types.data_var_at(record.data_address).is_some() {
        types.undefine_data_var(record.data_address)?;
    }
    types.define_data_var(record.data_address, DataType::char_array(record.length), None)?;

    types.define_data_var(
        record.pointer_address,
        DataType::named(&config.slice_type_name),
        Some(config.display_name(&record.text)),
    )?;
    info!("Defined new {} at 0x{:X}", config.slice_type_name, record.pointer_address);
    Ok(())
}
