//! Materials exposing the hysteretic models as quadrature point properties.
//!
//! The hysteresis state is a stateful property. It is advanced from the saturation of the two
//! previous time steps, so the materials that consume it within a time step never depend on the
//! material producing the saturation through the state.
use crate::capillary::{HystereticCapillaryPressure, HysteresisParameters};
use crate::hysteresis::HysteresisState;
use crate::relperm::{HystereticRelativePermeability, HystereticRelativePermeabilityParameters};
use strata::objects::{EvaluationContext, Material};
use strata::properties::{ObjectParameters, PropertyRef, PropertyRegistry, WritableProperty};
use strata::Real;

pub const LIQUID_SATURATION: &str = "liquid_saturation";
pub const CAPILLARY_PRESSURE: &str = "capillary_pressure";
pub const HYSTERESIS_STATE: &str = "hysteresis_state";
pub const DCAPILLARY_PRESSURE: &str = "dcapillary_pressure_dsaturation";
pub const D2CAPILLARY_PRESSURE: &str = "d2capillary_pressure_dsaturation2";
pub const DSATURATION: &str = "dliquid_saturation_dcapillary_pressure";
pub const D2SATURATION: &str = "d2liquid_saturation_dcapillary_pressure2";
pub const RELATIVE_PERMEABILITY_LIQUID: &str = "relative_permeability_liquid";
pub const RELATIVE_PERMEABILITY_GAS: &str = "relative_permeability_gas";
pub const DRELATIVE_PERMEABILITY_LIQUID: &str = "drelative_permeability_liquid_dsaturation";
pub const DRELATIVE_PERMEABILITY_GAS: &str = "drelative_permeability_gas_dsaturation";

/// Tracks the [`HysteresisState`] of every quadrature point.
///
/// In every step, the state of the previous step is advanced from the Older to the Old liquid
/// saturation.
pub struct HysteresisOrder<T: Real> {
    params: ObjectParameters,
    initial: HysteresisState<T>,
    state: WritableProperty<HysteresisState<T>>,
    old_state: PropertyRef<HysteresisState<T>>,
    old_saturation: PropertyRef<T>,
    older_saturation: PropertyRef<T>,
}

impl<T: Real> HysteresisOrder<T> {
    pub fn new(registry: &mut PropertyRegistry, params: ObjectParameters, initial: HysteresisState<T>) -> eyre::Result<Self> {
        let mut resolver = registry.resolver(params.clone())?;
        let state = resolver.declare::<HysteresisState<T>>(HYSTERESIS_STATE)?;
        let old_state = resolver.get_old::<HysteresisState<T>>(HYSTERESIS_STATE)?;
        let old_saturation = resolver.get_old::<T>(LIQUID_SATURATION)?;
        let older_saturation = resolver.get_older::<T>(LIQUID_SATURATION)?;
        Ok(Self {
            params,
            initial,
            state,
            old_state,
            old_saturation,
            older_saturation,
        })
    }
}

impl<T: Real> Material<T> for HysteresisOrder<T> {
    fn params(&self) -> &ObjectParameters {
        &self.params
    }

    fn init_qp_stateful_properties(&self, context: &EvaluationContext<'_, T>, qp: usize) -> eyre::Result<()> {
        context.properties.get_mut(&self.state)[qp] = self.initial;
        Ok(())
    }

    fn compute_qp_properties(&self, context: &EvaluationContext<'_, T>, qp: usize) -> eyre::Result<()> {
        let mut state = context.properties.get(&self.old_state)[qp];
        let previous = context.properties.get(&self.older_saturation)[qp];
        let current = context.properties.get(&self.old_saturation)[qp];
        state.update(previous, current);
        context.properties.get_mut(&self.state)[qp] = state;
        Ok(())
    }
}

/// Capillary pressure and its saturation derivatives from the liquid saturation.
pub struct CapillaryPressureFromSaturation<T: Real> {
    params: ObjectParameters,
    model: HystereticCapillaryPressure<T>,
    saturation: PropertyRef<T>,
    state: PropertyRef<HysteresisState<T>>,
    pc: WritableProperty<T>,
    dpc: WritableProperty<T>,
    d2pc: WritableProperty<T>,
}

impl<T: Real> CapillaryPressureFromSaturation<T> {
    pub fn new(
        registry: &mut PropertyRegistry,
        params: ObjectParameters,
        hysteresis: HysteresisParameters<T>,
    ) -> eyre::Result<Self> {
        let model = HystereticCapillaryPressure::new(&params.name, hysteresis)?;
        let mut resolver = registry.resolver(params.clone())?;
        Ok(Self {
            model,
            saturation: resolver.get::<T>(LIQUID_SATURATION)?,
            state: resolver.get::<HysteresisState<T>>(HYSTERESIS_STATE)?,
            pc: resolver.declare::<T>(CAPILLARY_PRESSURE)?,
            dpc: resolver.declare::<T>(DCAPILLARY_PRESSURE)?,
            d2pc: resolver.declare::<T>(D2CAPILLARY_PRESSURE)?,
            params,
        })
    }

    pub fn model(&self) -> &HystereticCapillaryPressure<T> {
        &self.model
    }
}

impl<T: Real> Material<T> for CapillaryPressureFromSaturation<T> {
    fn params(&self) -> &ObjectParameters {
        &self.params
    }

    fn compute_qp_properties(&self, context: &EvaluationContext<'_, T>, qp: usize) -> eyre::Result<()> {
        let properties = context.properties;
        let sl = properties.get(&self.saturation)[qp];
        let state = properties.get(&self.state)[qp];
        let curves = self.model.scanning_curves(&state);
        properties.get_mut(&self.pc)[qp] = curves.capillary_pressure(sl);
        properties.get_mut(&self.dpc)[qp] = curves.dcapillary_pressure(sl);
        properties.get_mut(&self.d2pc)[qp] = curves.d2capillary_pressure(sl);
        Ok(())
    }
}

/// Liquid saturation and its capillary-pressure derivatives from the capillary pressure.
pub struct SaturationFromCapillaryPressure<T: Real> {
    params: ObjectParameters,
    model: HystereticCapillaryPressure<T>,
    pc: PropertyRef<T>,
    state: PropertyRef<HysteresisState<T>>,
    saturation: WritableProperty<T>,
    ds: WritableProperty<T>,
    d2s: WritableProperty<T>,
}

impl<T: Real> SaturationFromCapillaryPressure<T> {
    pub fn new(
        registry: &mut PropertyRegistry,
        params: ObjectParameters,
        hysteresis: HysteresisParameters<T>,
    ) -> eyre::Result<Self> {
        let model = HystereticCapillaryPressure::new(&params.name, hysteresis)?;
        let mut resolver = registry.resolver(params.clone())?;
        Ok(Self {
            model,
            pc: resolver.get::<T>(CAPILLARY_PRESSURE)?,
            state: resolver.get::<HysteresisState<T>>(HYSTERESIS_STATE)?,
            saturation: resolver.declare::<T>(LIQUID_SATURATION)?,
            ds: resolver.declare::<T>(DSATURATION)?,
            d2s: resolver.declare::<T>(D2SATURATION)?,
            params,
        })
    }
}

impl<T: Real> Material<T> for SaturationFromCapillaryPressure<T> {
    fn params(&self) -> &ObjectParameters {
        &self.params
    }

    /// The saturation enters the hysteresis history, so it is initialized from the initial
    /// capillary pressure and hysteresis state.
    fn init_qp_stateful_properties(&self, context: &EvaluationContext<'_, T>, qp: usize) -> eyre::Result<()> {
        self.compute_qp_properties(context, qp)
    }

    fn compute_qp_properties(&self, context: &EvaluationContext<'_, T>, qp: usize) -> eyre::Result<()> {
        let properties = context.properties;
        let pc = properties.get(&self.pc)[qp];
        let state = properties.get(&self.state)[qp];
        let curves = self.model.scanning_curves(&state);
        properties.get_mut(&self.saturation)[qp] = curves.saturation(pc);
        properties.get_mut(&self.ds)[qp] = curves.dsaturation(pc);
        properties.get_mut(&self.d2s)[qp] = curves.d2saturation(pc);
        Ok(())
    }
}

/// Liquid and gas relative permeabilities with their saturation derivatives.
pub struct HystereticRelativePermeabilities<T: Real> {
    params: ObjectParameters,
    model: HystereticRelativePermeability<T>,
    saturation: PropertyRef<T>,
    state: PropertyRef<HysteresisState<T>>,
    liquid: WritableProperty<T>,
    dliquid: WritableProperty<T>,
    gas: WritableProperty<T>,
    dgas: WritableProperty<T>,
}

impl<T: Real> HystereticRelativePermeabilities<T> {
    pub fn new(
        registry: &mut PropertyRegistry,
        params: ObjectParameters,
        relperm: HystereticRelativePermeabilityParameters<T>,
    ) -> eyre::Result<Self> {
        let model = HystereticRelativePermeability::new(&params.name, relperm)?;
        let mut resolver = registry.resolver(params.clone())?;
        Ok(Self {
            model,
            saturation: resolver.get::<T>(LIQUID_SATURATION)?,
            state: resolver.get::<HysteresisState<T>>(HYSTERESIS_STATE)?,
            liquid: resolver.declare::<T>(RELATIVE_PERMEABILITY_LIQUID)?,
            dliquid: resolver.declare::<T>(DRELATIVE_PERMEABILITY_LIQUID)?,
            gas: resolver.declare::<T>(RELATIVE_PERMEABILITY_GAS)?,
            dgas: resolver.declare::<T>(DRELATIVE_PERMEABILITY_GAS)?,
            params,
        })
    }
}

impl<T: Real> Material<T> for HystereticRelativePermeabilities<T> {
    fn params(&self) -> &ObjectParameters {
        &self.params
    }

    fn compute_qp_properties(&self, context: &EvaluationContext<'_, T>, qp: usize) -> eyre::Result<()> {
        let properties = context.properties;
        let sl = properties.get(&self.saturation)[qp];
        let state = properties.get(&self.state)[qp];
        let (liquid, dliquid) = self.model.liquid_with_derivative(sl, &state);
        let (gas, dgas) = self.model.gas_with_derivative(sl, &state);
        properties.get_mut(&self.liquid)[qp] = liquid;
        properties.get_mut(&self.dliquid)[qp] = dliquid;
        properties.get_mut(&self.gas)[qp] = gas;
        properties.get_mut(&self.dgas)[qp] = dgas;
        Ok(())
    }
}
