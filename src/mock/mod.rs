pub mod mock_plc;
pub mod mock_rig;
